pub mod edge;
pub mod lanes;

pub use edge::{Edge, EdgeKind, LaneIdx};
pub use lanes::{LaneTracker, ResolvedEdge};
