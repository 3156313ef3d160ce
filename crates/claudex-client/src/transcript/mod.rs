//! Transcript projection
//!
//! Reduces an ordered event sequence into the materialized view the UI
//! renders: assistant text, thinking blocks, and a tool-call aggregate
//! forest.

mod projector;

pub use projector::{project, ToolAggregate, Transcript};
