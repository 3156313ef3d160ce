//! Persisted event log
//!
//! Messages are stored in a single text column: either a plain string
//! (legacy messages) or a JSON array of typed stream events. This module
//! owns the event types and the codec that converts between the persisted
//! string form and an ordered event sequence.

mod codec;
mod events;

pub use codec::{EventLogCodec, LogSource};
pub use events::{LineReview, StreamEvent, ToolPayload, ToolStatus};
