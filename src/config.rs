//! Tunables for an open index.
//!
//! A plain struct with a `Default` impl plus a few named presets for
//! common durability/performance tradeoffs, rather than scattering bare
//! constants through the crate.

/// Tunables for an open [`crate::tree::Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum records per leaf before it splits. Default: 64.
    pub leaf_size: usize,
    /// Hot-generation cache capacity. Default: 8192.
    pub max_cache_size: usize,
    /// Call `flush()` automatically after this many successful
    /// inserts/removes since the last flush. `None` disables it.
    pub auto_flush_interval: Option<u64>,
    /// Call `commit()` automatically after this many automatic (or
    /// manual) flushes since the last commit. `None` disables it.
    pub auto_commit_interval: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leaf_size: 64,
            max_cache_size: 8192,
            auto_flush_interval: Some(1000),
            auto_commit_interval: Some(10),
        }
    }
}

impl Config {
    /// No automatic flush/commit; the caller drives durability entirely.
    pub fn manual() -> Self {
        Self {
            auto_flush_interval: None,
            auto_commit_interval: None,
            ..Self::default()
        }
    }

    /// Commits after every flush — durable but chattier on the filesystem.
    pub fn durable() -> Self {
        Self {
            auto_flush_interval: Some(100),
            auto_commit_interval: Some(1),
            ..Self::default()
        }
    }

    /// Larger cache, sparser flush/commit — favors throughput over
    /// bounding the window of non-durable inserts.
    pub fn fast() -> Self {
        Self {
            max_cache_size: 65536,
            auto_flush_interval: Some(10_000),
            auto_commit_interval: Some(10),
            ..Self::default()
        }
    }
}
