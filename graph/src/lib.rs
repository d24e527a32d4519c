pub mod core;
pub mod layout;
pub mod stream;

pub use core::{Edge, EdgeKind, LaneIdx, LaneTracker, ResolvedEdge};
pub use layout::{LayoutAnomaly, LayoutEngine, LayoutRow, RowCache};
pub use stream::{
    GraphRow, GraphStream, StreamError, StreamEvent, StreamHandle, StreamOutcome, StreamSummary,
};
