// Table transformation pipeline: in-memory stages between source and sink

pub mod processing;

// Re-export key types and functions from each stage
pub use processing::{dedupe, enrich, join, normalize};
