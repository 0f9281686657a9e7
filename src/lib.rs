//! A disk-backed, approximate nearest-neighbor index over angular
//! distance, organized as a vantage-split binary tree.
//!
//! Records are key vectors (unit direction matters, magnitude does not)
//! plus an opaque payload. Inserts and removes mutate an in-memory cache;
//! [`Tree::flush`] stages the change set to a `cmt/` directory, and
//! [`Tree::commit`] promotes it into the durable `dat/` directory behind
//! a sentinel file, so a crash mid-commit always recovers to either the
//! pre- or post-commit state, never a torn one.
//!
//! Queries are lazy, pull-based, and cancelable by dropping the
//! iterator: [`Tree::query`] does a pruned best-first search (approximate
//! — the branch bound is a surrogate, not an exact triangle-inequality
//! bound), while [`Tree::flat_query`] does an exhaustive, exact-order
//! traversal for comparison or small indexes.
//!
//! # Quick Start
//!
//! ```
//! use tempfile::tempdir;
//! use vstree::{Config, Tree};
//!
//! let dir = tempdir().unwrap();
//! let mut tree = Tree::open(dir.path(), 2, Config::default()).unwrap();
//!
//! tree.insert(vec![1.0, 0.0], b"east".to_vec()).unwrap();
//! tree.insert(vec![0.0, 1.0], b"north".to_vec()).unwrap();
//! tree.commit().unwrap();
//!
//! let nearest = tree.query(vec![0.9, 0.1]).unwrap().next().unwrap().unwrap();
//! assert_eq!(nearest.record.payload, b"east");
//! ```

mod cache;
pub mod config;
pub mod error;
pub mod metric;
pub mod model;
mod node;
pub mod query;
mod store;
pub mod tree;

pub use config::Config;
pub use error::{Result, VsTreeError};
pub use model::{Meta, NodeId, Record, Vector, ROOT_ID};
pub use query::{FlatResults, QueryHit, QueryResults};
pub use tree::Tree;
