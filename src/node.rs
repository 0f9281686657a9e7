//! The tree node: leaf or internal, and the mutating operations that act
//! on one node at a time (insert, remove, split). Traversal (flatQuery,
//! best-first query) lives in [`crate::query`] since it spans many nodes
//! at once through lazy cursors.
//!
//! A node is modeled as a tagged enum rather than inferring leaf-vs-internal
//! from whether the children list happens to be empty — an explicit tag
//! is harder to get wrong as the representation grows.

use crate::metric::{all_close, dist};
use crate::model::{NodeId, Record, Vector};
use crate::tree::Tree;
use crate::Result;
use rand::Rng;

/// One node: a bag of records, or exactly two `(pivot, child)` routes.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A leaf holding an unordered bag of records.
    Leaf {
        /// Records owned by this leaf.
        records: Vec<Record>,
    },
    /// An internal node routing to children by nearest pivot.
    Internal {
        /// `(pivot, child_id)` pairs; the current design always produces
        /// exactly two, but the list can be extended by a future split
        /// strategy without changing the representation.
        children: Vec<(Vector, NodeId)>,
    },
}

impl Node {
    /// This node's records, or an empty slice if it is internal.
    pub fn records(&self) -> &[Record] {
        match self {
            Node::Leaf { records } => records,
            Node::Internal { .. } => &[],
        }
    }

    /// This node's children, or an empty slice if it is a leaf.
    pub fn children(&self) -> &[(Vector, NodeId)] {
        match self {
            Node::Internal { children } => children,
            Node::Leaf { .. } => &[],
        }
    }

    /// A node is a leaf iff its children list is empty.
    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }
}

/// Route to the child whose pivot is closest to `key`, ties broken by
/// scan order (first occurrence wins).
fn route<'a>(children: &'a [(Vector, NodeId)], key: &[f64]) -> &'a NodeId {
    let mut best: Option<(f64, &'a NodeId)> = None;
    for (pivot, id) in children {
        let d = dist(pivot, key);
        match best {
            Some((bd, _)) if d >= bd => {}
            _ => best = Some((d, id)),
        }
    }
    best.map(|(_, id)| id)
        .expect("internal node must have at least one child")
}

/// Insert `record` into the subtree rooted at `nid`.
pub fn insert(tree: &mut Tree, nid: &NodeId, record: Record) -> Result<()> {
    let node = tree.load_node(nid)?;
    match node {
        Node::Leaf { mut records } => {
            records.push(record);
            if records.len() > tree.config().leaf_size {
                let internal = split(tree, records)?;
                tree.save_dirty(nid.clone(), internal);
            } else {
                tree.save_dirty(nid.clone(), Node::Leaf { records });
            }
            Ok(())
        }
        Node::Internal { children } => {
            let target = route(&children, &record.key).clone();
            insert(tree, &target, record)
        }
    }
}

/// Remove the first record whose key all-closely matches `key`.
///
/// Routes strictly by `key` (the argument) at every internal node.
pub fn remove(tree: &mut Tree, nid: &NodeId, key: &[f64]) -> Result<Option<Record>> {
    let node = tree.load_node(nid)?;
    match node {
        Node::Leaf { mut records } => {
            match records.iter().position(|r| all_close(key, &r.key)) {
                Some(pos) => {
                    let removed = records.remove(pos);
                    tree.save_dirty(nid.clone(), Node::Leaf { records });
                    Ok(Some(removed))
                }
                None => Ok(None),
            }
        }
        Node::Internal { children } => {
            let target = route(&children, key).clone();
            remove(tree, &target, key)
        }
    }
}

/// Farthest-first refinement: approximate the diameter pair of `records`
/// in one linear scan instead of the `O(n^2)` exact computation.
fn select_splits(tree: &mut Tree, records: &[Record]) -> (Vector, Vector) {
    debug_assert!(records.len() >= 2, "split requires at least two records");
    let n = records.len();
    let i = tree.rng_mut().gen_range(0..n);
    let mut j = tree.rng_mut().gen_range(0..n);
    while j == i {
        j = tree.rng_mut().gen_range(0..n);
    }
    let mut a = records[i].key.clone();
    let mut b = records[j].key.clone();
    let mut d = dist(&a, &b);
    for r in records {
        let x = &r.key;
        let da = dist(&a, x);
        let db = dist(&b, x);
        if da > db {
            if da > d {
                b = x.clone();
                d = da;
            }
        } else if db > d {
            a = x.clone();
            d = db;
        }
    }
    (a, b)
}

/// Turn an over-full leaf's records into a fresh internal node with two
/// children, recursing if either child inherits more than `leaf_size`.
fn split(tree: &mut Tree, records: Vec<Record>) -> Result<Node> {
    let (a, b) = select_splits(tree, &records);
    let a_id = tree.mint_id();
    let b_id = tree.mint_id();
    // Materialize both as empty leaves before any record is assigned, so
    // a crash between minting and assignment still leaves both ids
    // resolvable to something.
    tree.load_node(&a_id)?;
    tree.load_node(&b_id)?;

    let mut a_records = Vec::new();
    let mut b_records = Vec::new();
    for r in records {
        let da = dist(&a, &r.key);
        let db = dist(&b, &r.key);
        // Ties broken by scan order: `a` is listed first among children.
        if da <= db {
            a_records.push(r);
        } else {
            b_records.push(r);
        }
    }
    finalize_child(tree, &a_id, a_records)?;
    finalize_child(tree, &b_id, b_records)?;

    Ok(Node::Internal {
        children: vec![(a, a_id), (b, b_id)],
    })
}

fn finalize_child(tree: &mut Tree, id: &NodeId, records: Vec<Record>) -> Result<()> {
    if records.len() > tree.config().leaf_size {
        let internal = split(tree, records)?;
        tree.save_dirty(id.clone(), internal);
    } else {
        tree.save_dirty(id.clone(), Node::Leaf { records });
    }
    Ok(())
}
