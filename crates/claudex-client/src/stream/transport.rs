//! Stream transport boundary
//!
//! The registry treats the live connection as an opaque object it can
//! attach typed listeners to and close. SSE, WebSocket, or in-process
//! channels all fit behind this trait.

use std::sync::Arc;

/// Typed channels a completion stream delivers frames on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamChannel {
    /// Incremental content: frames carry `{"event": <stream event>}` JSON.
    Content,
    /// Backend-reported failure: frames carry a string or `{"error": ...}`.
    Error,
    /// Generation finished normally.
    Complete,
}

/// One delivery from the transport.
#[derive(Debug, Clone, Default)]
pub struct StreamFrame {
    /// Frame payload, when the channel carries one.
    pub data: Option<String>,
    /// Resume cursor assigned by the backend, persisted so a reconnect
    /// can pick up mid-stream.
    pub last_event_id: Option<String>,
}

pub type FrameHandler = Arc<dyn Fn(StreamFrame) + Send + Sync>;

/// A live stream connection.
///
/// Delivery contract: frames for one stream arrive in order and at most
/// once. Transports that can reorder or redeliver must compensate before
/// invoking handlers; nothing above this boundary deduplicates.
pub trait StreamTransport: Send + Sync {
    /// Attach a listener for one channel. Multiple listeners per channel
    /// are allowed; invocation order follows attachment order.
    fn attach(&self, channel: StreamChannel, handler: FrameHandler);

    /// Detach every listener. Frames arriving afterwards are dropped.
    fn detach_all(&self);

    /// Close the connection. Idempotent.
    fn close(&self);
}
