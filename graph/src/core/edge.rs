use revgraph_core::CommitId;

/// A lane is a vertical column in the graph
pub type LaneIdx = usize;

/// A pending connector from an emitted row to a commit not yet seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Lane the edge occupies entering a row
    pub origin: LaneIdx,
    /// Lane the edge leaves the row on; equal to `origin` unless it
    /// converges on the row's node
    pub terminal: LaneIdx,
    /// Parent commit the edge leads to
    pub target: CommitId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// First parent, continuing the child's line
    FirstParent,
    /// Second or later parent of a merge
    Merge,
}

impl Edge {
    pub fn new(origin: LaneIdx, target: CommitId, kind: EdgeKind) -> Self {
        Self {
            origin,
            terminal: origin,
            target,
            kind,
        }
    }

    /// True when the edge runs straight through the row
    pub fn is_straight(&self) -> bool {
        self.origin == self.terminal
    }
}
