use revgraph_core::CommitId;
use smallvec::SmallVec;

use super::edge::{Edge, EdgeKind, LaneIdx};

/// An edge removed by [`LaneTracker::resolve_edge_at`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub edge: Edge,
    pub origin: LaneIdx,
    pub terminal: LaneIdx,
}

/// Ledger of open edges, indexed by originating and terminating lane.
///
/// Edges are kept in insertion order. Per-lane counters and the two
/// high-water marks are maintained on every mutation so the count queries,
/// which the layout asks for on every row, never scan.
#[derive(Debug, Default, Clone)]
pub struct LaneTracker {
    edges: Vec<Edge>,
    origin_counts: Vec<u32>,
    terminal_counts: Vec<u32>,
    /// One past the highest lane with an originating edge
    origin_width: usize,
    /// One past the highest lane with a terminating edge
    terminal_width: usize,
}

impl LaneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new edge at `origin`; returns its index
    pub fn add_edge(&mut self, origin: LaneIdx, target: CommitId, kind: EdgeKind) -> usize {
        self.edges.push(Edge::new(origin, target, kind));
        bump(&mut self.origin_counts, &mut self.origin_width, origin);
        bump(&mut self.terminal_counts, &mut self.terminal_width, origin);
        self.edges.len() - 1
    }

    /// The `position`-th edge originating at `lane`, in insertion order
    pub fn current_edge_at(&self, lane: LaneIdx, position: usize) -> Option<&Edge> {
        if position >= self.count_at(lane) {
            return None;
        }
        let mut seen = 0;
        for edge in &self.edges {
            if edge.origin == lane {
                if seen == position {
                    return Some(edge);
                }
                seen += 1;
            }
        }
        None
    }

    /// The `position`-th edge terminating at `lane`, in insertion order
    pub fn next_edge_at(&self, lane: LaneIdx, position: usize) -> Option<&Edge> {
        self.nth_terminating(lane, position).map(|idx| &self.edges[idx])
    }

    /// Remove the `position`-th edge terminating at `lane`
    pub fn resolve_edge_at(&mut self, lane: LaneIdx, position: usize) -> Option<ResolvedEdge> {
        let idx = self.nth_terminating(lane, position)?;
        let edge = self.edges.remove(idx);
        drop_count(&mut self.origin_counts, &mut self.origin_width, edge.origin);
        drop_count(&mut self.terminal_counts, &mut self.terminal_width, edge.terminal);
        Some(ResolvedEdge {
            edge,
            origin: edge.origin,
            terminal: edge.terminal,
        })
    }

    /// Steer edge `index` so it leaves the current row on `lane`
    pub fn converge(&mut self, index: usize, lane: LaneIdx) {
        let Some(edge) = self.edges.get_mut(index) else {
            return;
        };
        let previous = std::mem::replace(&mut edge.terminal, lane);
        drop_count(&mut self.terminal_counts, &mut self.terminal_width, previous);
        bump(&mut self.terminal_counts, &mut self.terminal_width, lane);
    }

    /// Remove every edge originating at `lane`; returns how many went
    pub fn clear_lane(&mut self, lane: LaneIdx) -> usize {
        if self.count_at(lane) == 0 {
            return 0;
        }
        let mut removed: SmallVec<[LaneIdx; 4]> = SmallVec::new();
        self.edges.retain(|edge| {
            if edge.origin == lane {
                removed.push(edge.terminal);
                false
            } else {
                true
            }
        });
        for &terminal in &removed {
            drop_count(&mut self.origin_counts, &mut self.origin_width, lane);
            drop_count(&mut self.terminal_counts, &mut self.terminal_width, terminal);
        }
        removed.len()
    }

    /// Take every open edge, leaving the tracker empty
    pub fn drain(&mut self) -> Vec<Edge> {
        self.origin_counts.clear();
        self.terminal_counts.clear();
        self.origin_width = 0;
        self.terminal_width = 0;
        std::mem::take(&mut self.edges)
    }

    /// Number of lanes in use at the top of a row
    pub fn count_originating(&self) -> usize {
        self.origin_width
    }

    /// Number of lanes in use at the bottom of a row
    pub fn count_terminating(&self) -> usize {
        self.terminal_width
    }

    /// Edges originating at `lane`
    pub fn count_at(&self, lane: LaneIdx) -> usize {
        match self.origin_counts.get(lane) {
            Some(&n) => n as usize,
            None => 0,
        }
    }

    /// Edges terminating at `lane`
    pub fn count_terminating_at(&self, lane: LaneIdx) -> usize {
        match self.terminal_counts.get(lane) {
            Some(&n) => n as usize,
            None => 0,
        }
    }

    /// A lane is free once nothing starts or ends on it
    pub fn is_free(&self, lane: LaneIdx) -> bool {
        self.count_at(lane) == 0 && self.count_terminating_at(lane) == 0
    }

    /// Lowest free lane; lanes stay contiguous from 0
    pub fn lowest_free_lane(&self) -> LaneIdx {
        let width = self.origin_width.max(self.terminal_width);
        (0..width).find(|&lane| self.is_free(lane)).unwrap_or(width)
    }

    /// Indices of the open edges leading to `target`
    pub fn edges_targeting(&self, target: &CommitId) -> SmallVec<[usize; 2]> {
        let mut found = SmallVec::new();
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.target == *target {
                found.push(idx);
            }
        }
        found
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn nth_terminating(&self, lane: LaneIdx, position: usize) -> Option<usize> {
        if position >= self.count_terminating_at(lane) {
            return None;
        }
        let mut seen = 0;
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.terminal == lane {
                if seen == position {
                    return Some(idx);
                }
                seen += 1;
            }
        }
        None
    }
}

fn bump(counts: &mut Vec<u32>, width: &mut usize, lane: LaneIdx) {
    if counts.len() <= lane {
        counts.resize(lane + 1, 0);
    }
    counts[lane] += 1;
    *width = (*width).max(lane + 1);
}

/// Decrement, then pull the high-water mark down past trailing empty
/// lanes. Each step down pairs with an earlier `bump`, so the trim is
/// amortized O(1).
fn drop_count(counts: &mut [u32], width: &mut usize, lane: LaneIdx) {
    if let Some(n) = counts.get_mut(lane) {
        *n = n.saturating_sub(1);
    }
    while *width > 0 && counts[*width - 1] == 0 {
        *width -= 1;
    }
}
