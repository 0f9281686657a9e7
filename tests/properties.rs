//! Quantified invariants and round-trip/idempotence properties, black-box
//! against the public `Tree` API. Each test opens its own `tempfile::tempdir`.

use std::fs;
use tempfile::tempdir;
use vstree::{Config, Tree};

fn unit(angle: f64) -> Vec<f64> {
    vec![angle.cos(), angle.sin()]
}

fn deterministic_angles(n: usize) -> Vec<f64> {
    let mut state = 7u64;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64 * std::f64::consts::TAU
        })
        .collect()
}

#[test]
fn size_tracks_inserts_minus_matched_removes() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::default(), 1).unwrap();
    for angle in deterministic_angles(20) {
        tree.insert(unit(angle), vec![]).unwrap();
    }
    assert_eq!(tree.meta().size, 20);

    let mut removed = 0;
    for angle in deterministic_angles(20).into_iter().take(5) {
        if tree.remove(&unit(angle)).unwrap().is_some() {
            removed += 1;
        }
    }
    assert_eq!(tree.meta().size, 20 - removed);
}

#[test]
fn flat_query_emits_the_full_inserted_set_in_nondecreasing_distance() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::default(), 2).unwrap();
    let angles = deterministic_angles(40);
    for a in &angles {
        tree.insert(unit(*a), vec![]).unwrap();
    }
    let hits: Vec<(f64, Vec<u8>)> = tree
        .flat_query(unit(0.0))
        .unwrap()
        .map(|r| r.unwrap())
        .map(|(d, rec)| (d, rec.payload))
        .collect();
    assert_eq!(hits.len(), angles.len());
    for w in hits.windows(2) {
        assert!(w[0].0 <= w[1].0 + 1e-12, "flatQuery must be non-decreasing");
    }
}

#[test]
fn query_emits_a_nondecreasing_subset_of_flat_query() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::default(), 3).unwrap();
    for a in deterministic_angles(60) {
        tree.insert(unit(a), vec![]).unwrap();
    }
    let query_hits: Vec<f64> = tree
        .query(unit(0.3))
        .unwrap()
        .map(|r| r.unwrap().distance)
        .collect();
    for w in query_hits.windows(2) {
        assert!(w[0] <= w[1] + 1e-12, "query must be non-decreasing");
    }
    let exhaustive_count = tree.flat_query(unit(0.3)).unwrap().count();
    assert!(query_hits.len() <= exhaustive_count);
}

#[test]
fn reopen_after_commit_reproduces_identical_results() {
    let dir = tempdir().unwrap();
    let before: Vec<(f64, Vec<u8>)> = {
        let mut tree = Tree::open_seeded(dir.path(), 2, Config::default(), 4).unwrap();
        for (i, a) in deterministic_angles(30).into_iter().enumerate() {
            tree.insert(unit(a), vec![i as u8]).unwrap();
        }
        tree.commit().unwrap();
        tree.flat_query(unit(1.0))
            .unwrap()
            .map(|r| r.unwrap())
            .map(|(d, rec)| (d, rec.payload))
            .collect()
    };
    let mut reopened = Tree::open_seeded(dir.path(), 2, Config::default(), 99).unwrap();
    let after: Vec<(f64, Vec<u8>)> = reopened
        .flat_query(unit(1.0))
        .unwrap()
        .map(|r| r.unwrap())
        .map(|(d, rec)| (d, rec.payload))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn auto_commit_interval_counts_flushes_not_mutations() {
    let dir = tempdir().unwrap();
    let config = Config {
        auto_flush_interval: Some(5),
        auto_commit_interval: Some(3),
        ..Config::default()
    };
    let mut tree = Tree::open_seeded(dir.path(), 2, config, 15).unwrap();
    let dat = dir.path().join("dat");

    for i in 0..10 {
        tree.insert(unit(i as f64), vec![]).unwrap();
    }
    // Two auto-flushes have fired (10 inserts / 5 per flush), but that's
    // short of the 3 flushes auto_commit_interval requires, so nothing
    // has been promoted into dat/ yet.
    assert_eq!(
        fs::read_dir(&dat).unwrap().count(),
        0,
        "commit must not fire until 3 flushes have happened, not 3 mutations"
    );

    for i in 10..15 {
        tree.insert(unit(i as f64), vec![]).unwrap();
    }
    // The third auto-flush (15 inserts total) crosses the auto-commit
    // threshold, so this round must promote into dat/.
    assert!(
        fs::read_dir(&dat).unwrap().count() > 0,
        "the third auto-flush must trigger an auto-commit"
    );
    assert_eq!(fs::read_dir(dir.path().join("cmt")).unwrap().count(), 0);
    assert_eq!(tree.meta().size, 15);
}

#[test]
fn flush_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::manual(), 5).unwrap();
    tree.insert(vec![1.0, 0.0], vec![9]).unwrap();
    tree.flush().unwrap();
    let dat_count_once = fs::read_dir(dir.path().join("cmt")).unwrap().count();
    tree.flush().unwrap();
    let dat_count_twice = fs::read_dir(dir.path().join("cmt")).unwrap().count();
    assert_eq!(dat_count_once, dat_count_twice);
}

#[test]
fn commit_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::manual(), 6).unwrap();
    tree.insert(vec![1.0, 0.0], vec![9]).unwrap();
    tree.commit().unwrap();
    let meta_once = tree.meta();
    tree.commit().unwrap();
    assert_eq!(meta_once, tree.meta());
    assert_eq!(fs::read_dir(dir.path().join("cmt")).unwrap().count(), 0);
}

#[test]
fn insert_then_remove_is_equivalent_to_a_no_op() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::default(), 8).unwrap();
    for a in deterministic_angles(10) {
        tree.insert(unit(a), vec![]).unwrap();
    }
    let before: Vec<f64> = tree
        .flat_query(unit(0.0))
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();

    let key = unit(2.5);
    tree.insert(key.clone(), b"transient".to_vec()).unwrap();
    let removed = tree.remove(&key).unwrap();
    assert!(removed.is_some());

    let after: Vec<f64> = tree
        .flat_query(unit(0.0))
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(before, after);
}

#[test]
fn first_insert_materializes_the_root_as_a_single_record_leaf() {
    let dir = tempdir().unwrap();
    let mut tree = Tree::open_seeded(dir.path(), 2, Config::default(), 9).unwrap();
    tree.insert(vec![1.0, 0.0], b"only".to_vec()).unwrap();
    let hits: Vec<_> = tree.flat_query(vec![1.0, 0.0]).unwrap().collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].as_ref().unwrap().1.payload, b"only");
    assert_eq!(tree.meta().nodes, 1);
}

#[test]
fn exceeding_leaf_size_triggers_a_split_and_mints_new_nodes() {
    let dir = tempdir().unwrap();
    let config = Config {
        leaf_size: 4,
        ..Config::default()
    };
    let mut tree = Tree::open_seeded(dir.path(), 2, config, 10).unwrap();
    assert_eq!(tree.meta().nodes, 1);
    for a in deterministic_angles(4) {
        tree.insert(unit(a), vec![]).unwrap();
    }
    assert_eq!(tree.meta().nodes, 1, "fifth record not yet inserted");
    tree.insert(unit(99.0), vec![]).unwrap();
    assert!(tree.meta().nodes > 1, "the split must have minted child nodes");
}

#[test]
fn interrupted_commit_with_sentinel_present_is_replayed_on_reopen() {
    let dir = tempdir().unwrap();
    {
        let mut tree = Tree::open_seeded(dir.path(), 2, Config::manual(), 11).unwrap();
        tree.insert(vec![1.0, 0.0], b"a".to_vec()).unwrap();
        tree.flush().unwrap();
        // Simulate a crash right after the commit sentinel is written,
        // before any staged file has been moved into dat/.
        fs::write(dir.path().join("cmt").join("commit"), b"").unwrap();
    }
    let mut reopened = Tree::open_seeded(dir.path(), 2, Config::manual(), 12).unwrap();
    let hits: Vec<_> = reopened.flat_query(vec![1.0, 0.0]).unwrap().collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(fs::read_dir(dir.path().join("cmt")).unwrap().count(), 0);
}

#[test]
fn interrupted_commit_without_sentinel_is_discarded_on_reopen() {
    let dir = tempdir().unwrap();
    {
        let mut tree = Tree::open_seeded(dir.path(), 2, Config::manual(), 13).unwrap();
        tree.insert(vec![1.0, 0.0], b"a".to_vec()).unwrap();
        tree.flush().unwrap();
        // No sentinel: this staging cycle was never decided and must be
        // discarded rather than replayed.
    }
    let mut reopened = Tree::open_seeded(dir.path(), 2, Config::manual(), 14).unwrap();
    assert_eq!(reopened.flat_query(vec![1.0, 0.0]).unwrap().count(), 0);
    assert_eq!(reopened.meta().size, 0);
}
