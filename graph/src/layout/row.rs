use std::sync::Arc;

use revgraph_core::RevisionRecord;
use smallvec::SmallVec;

use crate::core::{Edge, LaneIdx};

/// Frozen layout of one commit row
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRow {
    /// Position in layout order, counting every laid-out record
    pub row: usize,
    pub node: Arc<RevisionRecord>,
    /// Lane the commit occupies
    pub node_lane: LaneIdx,
    /// Edges entering this row, as they stood before the node's own parents
    /// were registered. Converging edges have `terminal == node_lane`.
    pub edges: Arc<[Edge]>,
    /// Lane each parent edge leaves on, in parent order
    pub parent_lanes: SmallVec<[LaneIdx; 2]>,
}

impl LayoutRow {
    /// Edges beginning at `lane` in this row
    pub fn count_at(&self, lane: LaneIdx) -> usize {
        let mut n = 0;
        for edge in self.edges.iter() {
            if edge.origin == lane {
                n += 1;
            }
        }
        n
    }

    /// The `n`-th edge beginning at `lane`
    pub fn edge_at(&self, lane: LaneIdx, n: usize) -> Option<&Edge> {
        self.edges.iter().filter(|e| e.origin == lane).nth(n)
    }

    /// Edges that end at this row's node
    pub fn incoming(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |e| e.target == self.node.id)
    }

    /// Edges passing by the node untouched
    pub fn passing(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |e| e.target != self.node.id)
    }

    /// Lanes needed to draw the row, both halves included
    pub fn width(&self) -> usize {
        let edges = self
            .edges
            .iter()
            .map(|e| e.origin.max(e.terminal) + 1)
            .max()
            .unwrap_or(0);
        let parents = self.parent_lanes.iter().map(|&l| l + 1).max().unwrap_or(0);
        edges.max(parents).max(self.node_lane + 1)
    }

    pub fn is_merge(&self) -> bool {
        self.parent_lanes.len() > 1
    }
}
