pub mod cache;
pub mod engine;
pub mod row;

pub use cache::RowCache;
pub use engine::{LayoutAnomaly, LayoutEngine};
pub use row::LayoutRow;
