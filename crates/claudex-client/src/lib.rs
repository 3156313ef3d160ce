//! Claudex client core
//!
//! The non-visual heart of the Claudex coding-assistant client: parsing
//! and caching the persisted conversation event log, projecting it into a
//! renderable transcript, tracking live completion streams, and
//! reconciling persisted stream state against the backend after a
//! reload. Rendering, routing, and auth live in the layers above; they
//! consume this crate through the services exported here.
//!
//! Key components:
//! - `event_log` - persisted log codec with a memoizing parse cache
//! - `transcript` - event sequence to text + tool-aggregate forest
//! - `stream` - session registry, transport boundary, resumption
//! - `storage` - durable key-value store and blob-URL bookkeeping
//! - `api` - the backend REST slice the stream core depends on

pub mod api;
pub mod error;
pub mod event_log;
pub mod storage;
pub mod stream;
pub mod transcript;

pub use api::{BackendApi, ChatStatus, HttpBackendClient};
pub use error::{ApiError, StreamError};
pub use event_log::{EventLogCodec, LineReview, StreamEvent, ToolPayload, ToolStatus};
pub use storage::{BlobUrlRegistry, FileStore, KeyValueStore, MemoryStore};
pub use stream::{
    ActiveStreamInfo, StreamCallbacks, StreamChannel, StreamFrame, StreamMetadata,
    StreamResumptionValidator, StreamSessionRegistry, StreamTransport,
};
pub use transcript::{project, ToolAggregate, Transcript};
