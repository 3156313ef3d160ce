//! Stream session registry
//!
//! Process-wide owner of live completion streams, at most one per chat.
//! Every lifecycle transition mutates durable storage alongside the
//! in-memory map so a reload can reconstruct what was in flight, and
//! completion/error callbacks fire exactly once per stream.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::BackendApi;
use crate::error::StreamError;
use crate::event_log::StreamEvent;
use crate::storage::KeyValueStore;
use crate::stream::metadata::{load_metadata, remove_metadata, upsert_metadata, StreamMetadata};
use crate::stream::transport::{StreamChannel, StreamFrame, StreamTransport};

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// Listener hooks a stream's owner registers alongside the transport.
#[derive(Default)]
pub struct StreamCallbacks {
    /// One decoded event arrived; the message id names the log it
    /// belongs to.
    pub on_chunk: Option<Box<dyn Fn(StreamEvent, &str) + Send + Sync>>,
    /// The generation finished normally.
    pub on_complete: Option<Box<dyn Fn(Option<&str>) + Send + Sync>>,
    /// The stream failed; the registry has already torn it down.
    pub on_error: Option<Box<dyn Fn(StreamError, Option<&str>) + Send + Sync>>,
}

struct ActiveStream {
    id: Uuid,
    message_id: String,
    start_time: DateTime<Utc>,
    transport: Arc<dyn StreamTransport>,
    cancellation: CancellationToken,
    callbacks: Arc<StreamCallbacks>,
}

/// Read-only snapshot of a registered stream.
#[derive(Debug, Clone)]
pub struct ActiveStreamInfo {
    pub id: Uuid,
    pub chat_id: String,
    pub message_id: String,
    pub start_time: DateTime<Utc>,
}

/// Content frames wrap the event so the backend can extend the envelope
/// without breaking old clients.
#[derive(Deserialize)]
struct ContentFrame {
    #[serde(default)]
    event: Option<StreamEvent>,
}

/// Registry of open completion streams, keyed by chat id.
pub struct StreamSessionRegistry {
    streams: DashMap<String, ActiveStream>,
    storage: Arc<dyn KeyValueStore>,
    backend: Arc<dyn BackendApi>,
    /// Handed to transport listeners so they can route frames back here
    /// without keeping the registry alive.
    weak_self: Weak<StreamSessionRegistry>,
}

impl StreamSessionRegistry {
    pub fn new(storage: Arc<dyn KeyValueStore>, backend: Arc<dyn BackendApi>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            streams: DashMap::new(),
            storage,
            backend,
            weak_self: weak.clone(),
        })
    }

    /// Register a freshly opened stream and persist its metadata.
    ///
    /// A chat holds at most one stream: registering over an existing one
    /// supersedes it, tearing the old stream down silently (its callbacks
    /// do not fire, it was replaced rather than failed) and upserting the
    /// persisted metadata.
    pub fn register(
        &self,
        chat_id: &str,
        message_id: &str,
        transport: Arc<dyn StreamTransport>,
        callbacks: StreamCallbacks,
    ) -> Uuid {
        if let Some((_, previous)) = self.streams.remove(chat_id) {
            debug!("superseding stream {} for chat {chat_id}", previous.id);
            teardown(&previous);
        }

        let stream = ActiveStream {
            id: Uuid::new_v4(),
            message_id: message_id.to_string(),
            start_time: Utc::now(),
            transport: Arc::clone(&transport),
            cancellation: CancellationToken::new(),
            callbacks: Arc::new(callbacks),
        };
        let stream_id = stream.id;

        upsert_metadata(
            &*self.storage,
            StreamMetadata {
                chat_id: chat_id.to_string(),
                message_id: message_id.to_string(),
                start_time: stream.start_time,
            },
        );
        self.streams.insert(chat_id.to_string(), stream);
        self.attach_handlers(chat_id, message_id, &transport);

        info!("registered stream {stream_id} for chat {chat_id}");
        stream_id
    }

    /// Tear down the chat's stream after a normal finish and fire
    /// `on_complete`. No-op when the chat has no stream.
    pub fn complete(&self, chat_id: &str) {
        let Some((_, stream)) = self.streams.remove(chat_id) else {
            return;
        };
        teardown(&stream);
        remove_metadata(&*self.storage, chat_id);
        info!("stream {} completed for chat {chat_id}", stream.id);

        if let Some(on_complete) = &stream.callbacks.on_complete {
            on_complete(Some(&stream.message_id));
        }
    }

    /// Tear down the chat's stream after a failure and fire `on_error`.
    /// Persisted metadata is cleared so the session cannot be resumed
    /// into a broken state.
    pub fn fail(&self, chat_id: &str, error: StreamError) {
        let Some((_, stream)) = self.streams.remove(chat_id) else {
            return;
        };
        teardown(&stream);
        remove_metadata(&*self.storage, chat_id);
        warn!("stream {} failed for chat {chat_id}: {error}", stream.id);

        if let Some(on_error) = &stream.callbacks.on_error {
            on_error(error, Some(&stream.message_id));
        }
    }

    /// Cooperatively cancel every registered stream: local teardown
    /// first (no callbacks, the caller initiated this), then best-effort
    /// concurrent stop requests to the backend for each chat. Server-side
    /// task cancellation is not guaranteed.
    pub async fn stop_all(&self) {
        let chat_ids: Vec<String> = self.streams.iter().map(|entry| entry.key().clone()).collect();
        if chat_ids.is_empty() {
            return;
        }
        info!("stopping {} active streams", chat_ids.len());

        for chat_id in &chat_ids {
            if let Some((_, stream)) = self.streams.remove(chat_id) {
                teardown(&stream);
                remove_metadata(&*self.storage, chat_id);
            }
        }

        let stops = chat_ids.iter().map(|chat_id| {
            let backend = Arc::clone(&self.backend);
            async move {
                if let Err(err) = backend.stop_generation(chat_id).await {
                    warn!("backend stop request failed for chat {chat_id}: {err}");
                }
            }
        });
        futures::future::join_all(stops).await;
    }

    pub fn is_streaming(&self, chat_id: &str) -> bool {
        self.streams.contains_key(chat_id)
    }

    pub fn active_stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn active_stream(&self, chat_id: &str) -> Option<ActiveStreamInfo> {
        self.streams.get(chat_id).map(|stream| ActiveStreamInfo {
            id: stream.id,
            chat_id: chat_id.to_string(),
            message_id: stream.message_id.clone(),
            start_time: stream.start_time,
        })
    }

    /// A child cancellation token for the chat's stream, for I/O tasks
    /// that want to observe teardown.
    pub fn cancellation_token(&self, chat_id: &str) -> Option<CancellationToken> {
        self.streams
            .get(chat_id)
            .map(|stream| stream.cancellation.child_token())
    }

    /// The persisted metadata entries, the source of truth after a
    /// reload until resumption validation repopulates the registry.
    pub fn persisted_metadata(&self) -> Vec<StreamMetadata> {
        load_metadata(&*self.storage)
    }

    /// The persisted resume cursor for a chat, when one was recorded.
    pub fn replay_cursor(&self, chat_id: &str) -> Option<String> {
        self.storage.get(&cursor_key(chat_id))
    }

    /// Drop the resume cursor so the next reconnect replays the stream
    /// from the beginning instead of resuming mid-flight.
    pub fn clear_replay_cursor(&self, chat_id: &str) {
        self.storage.remove(&cursor_key(chat_id));
    }

    fn attach_handlers(
        &self,
        chat_id: &str,
        message_id: &str,
        transport: &Arc<dyn StreamTransport>,
    ) {
        // Handlers hold the registry weakly: the transport must not keep
        // the registry alive, and frames after drop are discarded.
        let registry = self.weak_self.clone();
        let chat = chat_id.to_string();
        let message = message_id.to_string();
        transport.attach(
            StreamChannel::Content,
            Arc::new(move |frame| {
                if let Some(registry) = registry.upgrade() {
                    registry.handle_content_frame(&chat, &message, frame);
                }
            }),
        );

        let registry = self.weak_self.clone();
        let chat = chat_id.to_string();
        transport.attach(
            StreamChannel::Error,
            Arc::new(move |frame| {
                if let Some(registry) = registry.upgrade() {
                    registry.handle_error_frame(&chat, frame);
                }
            }),
        );

        let registry = self.weak_self.clone();
        let chat = chat_id.to_string();
        transport.attach(
            StreamChannel::Complete,
            Arc::new(move |frame| {
                if let Some(registry) = registry.upgrade() {
                    registry.handle_complete_frame(&chat, frame);
                }
            }),
        );
    }

    fn record_cursor(&self, chat_id: &str, frame: &StreamFrame) {
        if let Some(event_id) = &frame.last_event_id {
            self.storage.set(&cursor_key(chat_id), event_id);
        }
    }

    fn handle_content_frame(&self, chat_id: &str, message_id: &str, frame: StreamFrame) {
        self.record_cursor(chat_id, &frame);
        let Some(data) = frame.data else {
            return;
        };

        let callbacks = match self.streams.get(chat_id) {
            Some(stream) => Arc::clone(&stream.callbacks),
            None => return,
        };

        match serde_json::from_str::<ContentFrame>(&data) {
            Ok(ContentFrame { event: Some(event) }) => {
                if let Some(on_chunk) = &callbacks.on_chunk {
                    on_chunk(event, message_id);
                }
            }
            Ok(_) => {}
            Err(err) => warn!("stream content frame parse failed for chat {chat_id}: {err}"),
        }
    }

    fn handle_error_frame(&self, chat_id: &str, frame: StreamFrame) {
        self.record_cursor(chat_id, &frame);
        let message = decode_error_message(frame.data.as_deref());
        self.fail(chat_id, StreamError::Processing { message });
    }

    fn handle_complete_frame(&self, chat_id: &str, frame: StreamFrame) {
        self.record_cursor(chat_id, &frame);
        self.complete(chat_id);
    }
}

fn teardown(stream: &ActiveStream) {
    stream.transport.detach_all();
    stream.transport.close();
    stream.cancellation.cancel();
}

fn cursor_key(chat_id: &str) -> String {
    format!("chat:{chat_id}:lastEventId")
}

fn decode_error_message(data: Option<&str>) -> String {
    let Some(data) = data else {
        return DEFAULT_ERROR_MESSAGE.to_string();
    };
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(serde_json::Value::String(message)) => message,
        Ok(serde_json::Value::Object(map)) => map
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
        _ => DEFAULT_ERROR_MESSAGE.to_string(),
    }
}
