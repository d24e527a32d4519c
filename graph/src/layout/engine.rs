use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use revgraph_core::{CommitId, RevisionRecord};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::core::{Edge, EdgeKind, LaneIdx, LaneTracker};
use crate::layout::LayoutRow;

/// Inconsistency found while laying out a row.
///
/// Never fatal: the row is laid out on a best-effort basis and the stream
/// carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutAnomaly {
    /// The same commit arrived twice; the repeat is placed as a fresh root
    DuplicateCommit(CommitId),
    /// A parent was already laid out above its child
    ParentAlreadyEmitted { commit: CommitId, parent: CommitId },
    /// A commit listed the same parent more than once
    DuplicateParent { commit: CommitId, parent: CommitId },
}

impl fmt::Display for LayoutAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutAnomaly::DuplicateCommit(id) => write!(f, "commit {} seen twice", id.short()),
            LayoutAnomaly::ParentAlreadyEmitted { commit, parent } => write!(
                f,
                "parent {} of {} was laid out before it",
                parent.short(),
                commit.short()
            ),
            LayoutAnomaly::DuplicateParent { commit, parent } => write!(
                f,
                "{} lists parent {} more than once",
                commit.short(),
                parent.short()
            ),
        }
    }
}

/// Online lane assignment, one record at a time.
///
/// Records must arrive children before parents. The engine keeps only the
/// open edges and the ids already laid out, never the graph.
///
/// The laid-out ids only serve anomaly detection and cost one id per record
/// for the whole pass. [`with_seen_window`](Self::with_seen_window) caps them
/// to the most recent ids; duplicates and out-of-order parents older than the
/// window then go unnoticed and are laid out as ordinary commits.
#[derive(Debug, Default)]
pub struct LayoutEngine {
    lanes: LaneTracker,
    laid_out: HashSet<CommitId>,
    /// Insertion order of `laid_out`, kept only when a window is set
    seen_order: VecDeque<CommitId>,
    seen_window: Option<usize>,
    rows: usize,
    anomalies: usize,
    max_width: usize,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember at most `window` laid-out ids; `None` remembers all of them
    pub fn with_seen_window(window: Option<usize>) -> Self {
        Self {
            seen_window: window,
            ..Self::default()
        }
    }

    /// Lay out the next record and return its frozen row
    pub fn push(&mut self, node: Arc<RevisionRecord>) -> LayoutRow {
        let row = self.rows;
        self.rows += 1;
        let id = node.id;

        if !self.remember(id) {
            self.report(LayoutAnomaly::DuplicateCommit(id));
            let duplicate = LayoutRow {
                row,
                node,
                node_lane: self.lanes.lowest_free_lane(),
                edges: Arc::from(self.lanes.edges()),
                parent_lanes: SmallVec::new(),
            };
            return self.freeze(duplicate);
        }

        // 1) take the lowest lane already heading here, or a free one
        let incoming = self.lanes.edges_targeting(&id);
        let edges = self.lanes.edges();
        let node_lane = incoming
            .iter()
            .map(|&idx| edges[idx].origin)
            .min()
            .unwrap_or_else(|| self.lanes.lowest_free_lane());
        for &idx in &incoming {
            self.lanes.converge(idx, node_lane);
        }

        // 2) snapshot before our own parents are registered
        let snapshot: Arc<[Edge]> = Arc::from(self.lanes.edges());

        self.resolve_incoming(id, node_lane);

        // 3) first parent continues straight down, the rest fan out
        let parent_lanes = self.register_parents(&node, node_lane);

        // 5) a root leaves nothing behind on its lane
        if parent_lanes.is_empty() {
            self.lanes.clear_lane(node_lane);
        }

        trace!(row, lane = node_lane, commit = %id.short(), "laid out row");

        let laid_out = LayoutRow {
            row,
            node,
            node_lane,
            edges: snapshot,
            parent_lanes,
        };
        self.freeze(laid_out)
    }

    /// Close every edge still open; they lead to commits that never arrived.
    ///
    /// Run once, at end of stream. Returns the edges that were dropped.
    pub fn finish(&mut self) -> Vec<Edge> {
        let dangling = self.lanes.drain();
        if !dangling.is_empty() {
            debug!(count = dangling.len(), "pruned dangling edges");
        }
        dangling
    }

    pub fn lanes(&self) -> &LaneTracker {
        &self.lanes
    }

    /// Rows laid out so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Anomalies recovered from so far
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// Widest row seen so far
    pub fn max_width(&self) -> usize {
        self.max_width
    }

    /// Laid-out ids currently remembered for anomaly detection
    pub fn seen(&self) -> usize {
        self.laid_out.len()
    }

    /// Record `id` as laid out; false if it already was
    fn remember(&mut self, id: CommitId) -> bool {
        if !self.laid_out.insert(id) {
            return false;
        }
        if let Some(window) = self.seen_window {
            self.seen_order.push_back(id);
            while self.seen_order.len() > window {
                if let Some(oldest) = self.seen_order.pop_front() {
                    self.laid_out.remove(&oldest);
                }
            }
        }
        true
    }

    /// Close the edges converged onto `node_lane` that end at `id`
    fn resolve_incoming(&mut self, id: CommitId, node_lane: LaneIdx) {
        let mut position = 0;
        while let Some(edge) = self.lanes.next_edge_at(node_lane, position) {
            if edge.target == id {
                self.lanes.resolve_edge_at(node_lane, position);
            } else {
                position += 1;
            }
        }
    }

    fn register_parents(&mut self, node: &RevisionRecord, node_lane: LaneIdx) -> SmallVec<[LaneIdx; 2]> {
        let mut parent_lanes: SmallVec<[LaneIdx; 2]> = SmallVec::new();
        let mut registered: SmallVec<[CommitId; 2]> = SmallVec::new();

        for &parent in &node.parent_ids {
            if self.laid_out.contains(&parent) {
                self.report(LayoutAnomaly::ParentAlreadyEmitted {
                    commit: node.id,
                    parent,
                });
                continue;
            }
            if registered.contains(&parent) {
                self.report(LayoutAnomaly::DuplicateParent {
                    commit: node.id,
                    parent,
                });
                continue;
            }

            let (lane, kind) = if parent_lanes.is_empty() {
                (node_lane, EdgeKind::FirstParent)
            } else {
                (self.lanes.lowest_free_lane(), EdgeKind::Merge)
            };
            self.lanes.add_edge(lane, parent, kind);
            parent_lanes.push(lane);
            registered.push(parent);
        }

        parent_lanes
    }

    fn freeze(&mut self, row: LayoutRow) -> LayoutRow {
        self.max_width = self.max_width.max(row.width());
        row
    }

    fn report(&mut self, anomaly: LayoutAnomaly) {
        self.anomalies += 1;
        warn!(%anomaly, "layout inconsistency");
    }
}
