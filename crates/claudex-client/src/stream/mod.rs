//! Stream sessions
//!
//! Live generation streams and what survives them: the registry owning
//! open connections, the opaque transport boundary, the persisted
//! metadata that lets a reload find an in-flight generation again, and
//! the validator that reconciles that metadata against backend truth at
//! startup.

mod metadata;
mod registry;
mod resumption;
mod transport;

pub use metadata::StreamMetadata;
pub use registry::{ActiveStreamInfo, StreamCallbacks, StreamSessionRegistry};
pub use resumption::{StreamResumptionValidator, ValidationCallback};
pub use transport::{FrameHandler, StreamChannel, StreamFrame, StreamTransport};
