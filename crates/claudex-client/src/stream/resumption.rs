//! Stream resumption validation
//!
//! After a reload, persisted stream metadata may describe generations
//! that finished or died while the client was gone. This runs once per
//! session: every entry is checked against the backend concurrently, and
//! anything without a live task is discarded so the UI never shows a
//! streaming indicator that can never resolve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::api::BackendApi;
use crate::storage::KeyValueStore;
use crate::stream::metadata::{load_metadata, remove_metadata};

pub type ValidationCallback = Box<dyn FnOnce() + Send>;

/// One-shot reconciliation of persisted stream metadata against backend
/// truth.
pub struct StreamResumptionValidator {
    storage: Arc<dyn KeyValueStore>,
    backend: Arc<dyn BackendApi>,
    has_run: AtomicBool,
}

impl StreamResumptionValidator {
    pub fn new(storage: Arc<dyn KeyValueStore>, backend: Arc<dyn BackendApi>) -> Self {
        Self {
            storage,
            backend,
            has_run: AtomicBool::new(false),
        }
    }

    /// Validate every persisted metadata entry. Idempotent: the second
    /// and later calls return immediately without touching storage or
    /// the backend. The callback fires after all status queries settle,
    /// whether they succeeded or not.
    pub async fn validate(&self, on_complete: Option<ValidationCallback>) {
        if self.has_run.swap(true, Ordering::SeqCst) {
            debug!("stream validation already ran this session");
            return;
        }

        let entries = load_metadata(&*self.storage);
        if entries.is_empty() {
            if let Some(callback) = on_complete {
                callback();
            }
            return;
        }

        info!("validating {} persisted stream(s)", entries.len());
        let checks = entries.iter().map(|entry| {
            let backend = Arc::clone(&self.backend);
            let storage = Arc::clone(&self.storage);
            async move {
                match backend.chat_status(&entry.chat_id).await {
                    Ok(status) if status.has_active_task => {
                        debug!("chat {} still has an active task", entry.chat_id);
                    }
                    Ok(_) => {
                        // Metadata is only removed once the backend has
                        // answered, never optimistically.
                        info!("discarding stale stream metadata for chat {}", entry.chat_id);
                        remove_metadata(&*storage, &entry.chat_id);
                    }
                    Err(err) => {
                        // Fail toward discarding: a phantom streaming
                        // indicator is worse than a dropped resume.
                        warn!("stream validation failed for chat {}: {err}", entry.chat_id);
                        remove_metadata(&*storage, &entry.chat_id);
                    }
                }
            }
        });
        join_all(checks).await;

        if let Some(callback) = on_complete {
            callback();
        }
    }
}
