//! Ordered traversal: the exhaustive `flatQuery` fallback and the
//! pruning best-first `query` driver.
//!
//! Both are modeled as manual pull cursors with a fallible
//! `next(&mut self) -> Result<Option<T>>` method rather than
//! `std::iter::Iterator` directly. Each cursor takes `&mut Tree` on every
//! pull (rather than borrowing it for the cursor's lifetime) so that a
//! single open traversal can recursively touch many cache-resident
//! nodes without fighting the borrow checker over simultaneously "open"
//! sibling sub-streams. The public-facing [`FlatResults`] / [`QueryResults`]
//! wrap a cursor together with the one `&mut Tree` borrow the whole
//! traversal needs and do implement `Iterator`, since at that boundary
//! there is exactly one mutable borrow outstanding.

use crate::metric::dist;
use crate::model::{NodeId, Record, Vector};
use crate::node::Node;
use crate::tree::Tree;
use crate::Result;
use std::collections::{HashMap, HashSet};

/// One yielded hit from [`Tree::query`], with the diagnostic counters
/// accumulated so far in this traversal — free to compute alongside the
/// search, so they're included rather than requiring a second pass.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// Angular distance from the query key to this record's key.
    pub distance: f64,
    /// The matched record.
    pub record: Record,
    /// Distinct node ids visited so far in this traversal.
    pub nodes_visited: usize,
    /// Distinct leaves visited so far in this traversal.
    pub leaves_visited: usize,
    /// Sum of record counts across visited leaves.
    pub total_leaf_records: usize,
    /// `total_leaf_records / leaves_visited`, or `0.0` before any leaf is visited.
    pub avg_leaf_fill: f64,
}

#[derive(Default)]
struct Telemetry {
    visited_nodes: HashSet<NodeId>,
    leaf_sizes: HashMap<NodeId, usize>,
}

impl Telemetry {
    fn record_visit(&mut self, nid: &NodeId, node: &Node) {
        self.visited_nodes.insert(nid.clone());
        if let Node::Leaf { records } = node {
            self.leaf_sizes.insert(nid.clone(), records.len());
        }
    }

    fn snapshot(&self, distance: f64, record: Record) -> QueryHit {
        let leaves_visited = self.leaf_sizes.len();
        let total_leaf_records: usize = self.leaf_sizes.values().sum();
        let avg_leaf_fill = if leaves_visited == 0 {
            0.0
        } else {
            total_leaf_records as f64 / leaves_visited as f64
        };
        QueryHit {
            distance,
            record,
            nodes_visited: self.visited_nodes.len(),
            leaves_visited,
            total_leaf_records,
            avg_leaf_fill,
        }
    }
}

// ---------------------------------------------------------------------
// flatQuery: exhaustive, exact ordered merge.
// ---------------------------------------------------------------------

enum FlatState {
    Leaf(std::vec::IntoIter<(f64, Record)>),
    /// Kept sorted ascending by head distance; `open[0]` is the next to emit.
    Internal(Vec<FlatChild>),
}

struct FlatChild {
    head: (f64, Record),
    cursor: FlatCursor,
}

/// One node's worth of exhaustive, exact-order traversal state.
struct FlatCursor {
    state: FlatState,
}

impl FlatCursor {
    fn open(tree: &mut Tree, nid: &NodeId, key: &[f64]) -> Result<Self> {
        let node = tree.load_node(nid)?;
        let state = match node {
            Node::Leaf { records } => {
                let mut sorted: Vec<(f64, Record)> =
                    records.into_iter().map(|r| (dist(&r.key, key), r)).collect();
                sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                FlatState::Leaf(sorted.into_iter())
            }
            Node::Internal { children } => {
                let mut open = Vec::with_capacity(children.len());
                for (_, child_id) in &children {
                    let mut cursor = FlatCursor::open(tree, child_id, key)?;
                    if let Some(head) = cursor.next(tree, key)? {
                        open.push(FlatChild { head, cursor });
                    }
                }
                open.sort_by(|a, b| a.head.0.partial_cmp(&b.head.0).unwrap());
                FlatState::Internal(open)
            }
        };
        Ok(Self { state })
    }

    fn next(&mut self, tree: &mut Tree, key: &[f64]) -> Result<Option<(f64, Record)>> {
        match &mut self.state {
            FlatState::Leaf(iter) => Ok(iter.next()),
            FlatState::Internal(open) => {
                if open.is_empty() {
                    return Ok(None);
                }
                let FlatChild { head, mut cursor } = open.remove(0);
                if let Some(next_head) = cursor.next(tree, key)? {
                    let pos = open.partition_point(|c| c.head.0 <= next_head.0);
                    open.insert(
                        pos,
                        FlatChild {
                            head: next_head,
                            cursor,
                        },
                    );
                }
                Ok(Some(head))
            }
        }
    }
}

/// Iterator produced by [`Tree::flat_query`]: exact, non-decreasing
/// distance, exhaustive over every record in the index.
pub struct FlatResults<'a> {
    tree: &'a mut Tree,
    key: Vector,
    cursor: FlatCursor,
}

impl<'a> FlatResults<'a> {
    pub(crate) fn new(tree: &'a mut Tree, key: Vector, root: &NodeId) -> Result<Self> {
        let cursor = FlatCursor::open(tree, root, &key)?;
        Ok(Self { tree, key, cursor })
    }
}

impl<'a> Iterator for FlatResults<'a> {
    type Item = Result<(f64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(self.tree, &self.key).transpose()
    }
}

// ---------------------------------------------------------------------
// query: pruning best-first search.
// ---------------------------------------------------------------------

enum QueryState {
    Leaf(std::vec::IntoIter<(f64, Record)>),
    Internal {
        /// Unopened children, sorted ascending by pivot distance.
        pending: Vec<(f64, NodeId)>,
        /// Opened children, sorted ascending by current head distance.
        open: Vec<QueryChild>,
    },
}

struct QueryChild {
    pivot_distance: f64,
    head: (f64, Record),
    cursor: QueryCursor,
}

/// One node's worth of pruning best-first traversal state.
struct QueryCursor {
    state: QueryState,
}

impl QueryCursor {
    fn open(tree: &mut Tree, nid: &NodeId, key: &[f64], telemetry: &mut Telemetry) -> Result<Self> {
        let node = tree.load_node(nid)?;
        telemetry.record_visit(nid, &node);
        let state = match node {
            Node::Leaf { records } => {
                let mut sorted: Vec<(f64, Record)> =
                    records.into_iter().map(|r| (dist(&r.key, key), r)).collect();
                sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                QueryState::Leaf(sorted.into_iter())
            }
            Node::Internal { children } => {
                let mut pending: Vec<(f64, NodeId)> = children
                    .iter()
                    .map(|(pivot, id)| (dist(pivot, key), id.clone()))
                    .collect();
                pending.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                QueryState::Internal {
                    pending,
                    open: Vec::new(),
                }
            }
        };
        Ok(Self { state })
    }

    fn next(&mut self, tree: &mut Tree, key: &[f64], telemetry: &mut Telemetry) -> Result<Option<(f64, Record)>> {
        match &mut self.state {
            QueryState::Leaf(iter) => Ok(iter.next()),
            QueryState::Internal { .. } => self.next_internal(tree, key, telemetry),
        }
    }

    fn next_internal(
        &mut self,
        tree: &mut Tree,
        key: &[f64],
        telemetry: &mut Telemetry,
    ) -> Result<Option<(f64, Record)>> {
        loop {
            let QueryState::Internal { pending, open } = &mut self.state else {
                unreachable!("next_internal only called on an internal cursor");
            };

            if open.is_empty() {
                if pending.is_empty() {
                    return Ok(None);
                }
                Self::open_next_pending(tree, key, telemetry, pending, open)?;
                continue;
            }

            // Triangle-inequality surrogate bound: only worth opening the
            // next unopened child if its sub-tree could still beat the
            // current best head.
            if let Some(&(d_next, _)) = pending.first() {
                let h = &open[0];
                if d_next < h.head.0 + h.pivot_distance {
                    Self::open_next_pending(tree, key, telemetry, pending, open)?;
                    continue;
                }
            }

            let QueryChild {
                pivot_distance,
                head,
                mut cursor,
            } = open.remove(0);
            if let Some(next_head) = cursor.next(tree, key, telemetry)? {
                let pos = open.partition_point(|c| c.head.0 <= next_head.0);
                open.insert(
                    pos,
                    QueryChild {
                        pivot_distance,
                        head: next_head,
                        cursor,
                    },
                );
            }
            return Ok(Some(head));
        }
    }

    fn open_next_pending(
        tree: &mut Tree,
        key: &[f64],
        telemetry: &mut Telemetry,
        pending: &mut Vec<(f64, NodeId)>,
        open: &mut Vec<QueryChild>,
    ) -> Result<()> {
        let (pivot_distance, child_id) = pending.remove(0);
        let mut cursor = QueryCursor::open(tree, &child_id, key, telemetry)?;
        if let Some(head) = cursor.next(tree, key, telemetry)? {
            let pos = open.partition_point(|c| c.head.0 <= head.0);
            open.insert(
                pos,
                QueryChild {
                    pivot_distance,
                    head,
                    cursor,
                },
            );
        }
        Ok(())
    }
}

/// Iterator produced by [`Tree::query`]: approximate, non-decreasing
/// distance, pruned by the triangle-inequality surrogate bound.
pub struct QueryResults<'a> {
    tree: &'a mut Tree,
    key: Vector,
    cursor: QueryCursor,
    telemetry: Telemetry,
}

impl<'a> QueryResults<'a> {
    pub(crate) fn new(tree: &'a mut Tree, key: Vector, root: &NodeId) -> Result<Self> {
        let mut telemetry = Telemetry::default();
        let cursor = QueryCursor::open(tree, root, &key, &mut telemetry)?;
        Ok(Self {
            tree,
            key,
            cursor,
            telemetry,
        })
    }
}

impl<'a> Iterator for QueryResults<'a> {
    type Item = Result<QueryHit>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.next(self.tree, &self.key, &mut self.telemetry) {
            Ok(Some((distance, record))) => Some(Ok(self.telemetry.snapshot(distance, record))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
