//! The façade tying the store, cache, config, and meta counters together
//! into the one type applications hold open.
//!
//! One struct owns every subsystem and exposes the public operations,
//! plus a handful of `pub(crate)` seams ([`Tree::load_node`], [`Tree::save_dirty`],
//! [`Tree::mint_id`]) so sibling modules ([`crate::node`], [`crate::query`])
//! can drive the cache and id space without reaching into private fields.

use crate::cache::NodeCache;
use crate::config::Config;
use crate::error::{Result, VsTreeError};
use crate::model::{Meta, NodeId, Record, Vector, ROOT_ID};
use crate::node::{self, Node};
use crate::query::{FlatResults, QueryResults};
use crate::store::NodeStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::{debug, info};

/// An open vantage-split tree index.
///
/// Holds the node store, the two-generation cache, and the meta counters.
/// Mutations ([`Tree::insert`], [`Tree::remove`]) are buffered in the
/// cache's dirty set; [`Tree::flush`] stages them to disk, and
/// [`Tree::commit`] stages then durably promotes them.
pub struct Tree {
    store: NodeStore,
    cache: NodeCache,
    config: Config,
    meta: Meta,
    dimension: usize,
    rng: StdRng,
    ops_since_flush: u64,
    flushes_since_commit: u64,
}

impl Tree {
    /// Open (or create) an index rooted at `root` for vectors of length
    /// `dimension`, recovering any interrupted commit.
    pub fn open(root: &Path, dimension: usize, config: Config) -> Result<Self> {
        Self::open_with_rng(root, dimension, config, StdRng::from_entropy())
    }

    /// Like [`Tree::open`], but with a seeded RNG for deterministic split
    /// selection and id minting — intended for tests.
    pub fn open_seeded(root: &Path, dimension: usize, config: Config, seed: u64) -> Result<Self> {
        Self::open_with_rng(root, dimension, config, StdRng::seed_from_u64(seed))
    }

    fn open_with_rng(root: &Path, dimension: usize, config: Config, rng: StdRng) -> Result<Self> {
        let store = NodeStore::open(root)?;
        let meta = store.load_meta()?;
        info!(dimension, size = meta.size, nodes = meta.nodes, "tree.open");
        Ok(Self {
            store,
            cache: NodeCache::new(config.max_cache_size),
            config,
            meta,
            dimension,
            rng,
            ops_since_flush: 0,
            flushes_since_commit: 0,
        })
    }

    /// Insert `key`/`payload` as a new record.
    ///
    /// # Errors
    /// Returns [`VsTreeError::DimensionMismatch`] if `key.len()` does not
    /// match the dimension the index was opened with.
    pub fn insert(&mut self, key: Vector, payload: Vec<u8>) -> Result<()> {
        self.check_dimension(&key)?;
        let root = ROOT_ID.to_string();
        node::insert(self, &root, Record::new(key, payload))?;
        self.meta.size += 1;
        self.note_mutation()
    }

    /// Remove the first record whose key all-closely matches `key`.
    pub fn remove(&mut self, key: &[f64]) -> Result<Option<Record>> {
        self.check_dimension(key)?;
        let root = ROOT_ID.to_string();
        let removed = node::remove(self, &root, key)?;
        if removed.is_some() {
            self.meta.size = self.meta.size.saturating_sub(1);
            self.note_mutation()?;
        }
        Ok(removed)
    }

    /// Approximate nearest-neighbor search, best-first and pruned by the
    /// triangle-inequality surrogate bound. Cancel by dropping the
    /// returned iterator before exhausting it.
    pub fn query(&mut self, key: Vector) -> Result<QueryResults<'_>> {
        self.check_dimension(&key)?;
        let root = ROOT_ID.to_string();
        QueryResults::new(self, key, &root)
    }

    /// Exhaustive, exact ordered nearest-neighbor traversal — visits
    /// every record, in non-decreasing distance order. Useful as a
    /// correctness baseline for [`Tree::query`] or on indexes small
    /// enough that the pruning doesn't matter.
    pub fn flat_query(&mut self, key: Vector) -> Result<FlatResults<'_>> {
        self.check_dimension(&key)?;
        let root = ROOT_ID.to_string();
        FlatResults::new(self, key, &root)
    }

    /// Stage every dirty node and the meta counters into `cmt/`, without
    /// promoting them into `dat/`. A crash after this point is still
    /// recoverable only as a discard (the sentinel has not been written).
    pub fn flush(&mut self) -> Result<()> {
        self.stage_dirty_and_meta()?;
        self.ops_since_flush = 0;
        self.flushes_since_commit += 1;
        self.maybe_auto_commit()
    }

    /// Flush, then promote `cmt/` into `dat/` — the durable commit point.
    pub fn commit(&mut self) -> Result<()> {
        self.stage_dirty_and_meta()?;
        self.ops_since_flush = 0;
        self.store.promote()?;
        self.flushes_since_commit = 0;
        debug!("tree.commit: promoted staged writes");
        Ok(())
    }

    fn stage_dirty_and_meta(&mut self) -> Result<()> {
        let dirty = self.cache.take_dirty();
        debug!(count = dirty.len(), "tree.flush: staging dirty nodes");
        for (nid, node) in dirty {
            self.store.save(&nid, node.records(), node.children())?;
            self.cache.insert_clean(nid, node);
        }
        self.store.stage_meta(self.meta)
    }

    fn maybe_auto_commit(&mut self) -> Result<()> {
        if let Some(n) = self.config.auto_commit_interval {
            if n > 0 && self.flushes_since_commit >= n {
                self.commit()?;
            }
        }
        Ok(())
    }

    /// The current size/nodes counters.
    pub fn meta(&self) -> Meta {
        self.meta
    }

    /// The dimension this index was opened with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn note_mutation(&mut self) -> Result<()> {
        self.ops_since_flush += 1;
        if let Some(n) = self.config.auto_flush_interval {
            if n > 0 && self.ops_since_flush >= n {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn check_dimension(&self, key: &[f64]) -> Result<()> {
        if key.len() != self.dimension {
            return Err(VsTreeError::DimensionMismatch {
                expected: self.dimension,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Load a node by id: dirty or cached, or decoded fresh from disk. A
    /// node absent everywhere is an empty leaf (bootstraps the root and
    /// freshly minted children).
    pub(crate) fn load_node(&mut self, nid: &NodeId) -> Result<Node> {
        if let Some(node) = self.cache.get(nid) {
            return Ok(node);
        }
        let (records, children) = self.store.load(nid)?;
        let node = if children.is_empty() {
            Node::Leaf { records }
        } else {
            Node::Internal { children }
        };
        self.cache.insert_clean(nid.clone(), node.clone());
        Ok(node)
    }

    /// Record a mutated node as dirty; it will be written out on the next
    /// [`Tree::flush`].
    pub(crate) fn save_dirty(&mut self, nid: NodeId, node: Node) {
        self.cache.mark_dirty(nid, node);
    }

    /// Mint a fresh node id, rejecting collisions against any node
    /// resident in the cache or already on disk.
    pub(crate) fn mint_id(&mut self) -> NodeId {
        loop {
            let bytes: [u8; 16] = self.rng.gen();
            let candidate = hex::encode(bytes);
            if !self.cache.contains(&candidate) && !self.store.exists_on_disk(&candidate) {
                self.meta.nodes += 1;
                return candidate;
            }
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
