//! Uploaded-file blob URL bookkeeping
//!
//! The chat UI hands out object URLs for uploaded files and needs to
//! revoke them eventually. Entries live under a single storage key with a
//! fixed 24-hour retention window; cleanup reports the expired URLs so
//! the embedder can release the underlying resources.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KeyValueStore;

const STORAGE_KEY: &str = "uploaded_blob_urls";
const RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobEntry {
    url: String,
    timestamp: DateTime<Utc>,
}

/// Time-bounded registry of blob URLs keyed by file identity.
pub struct BlobUrlRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl BlobUrlRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record a URL for a file key, stamped with the current time.
    pub fn record(&self, file_key: &str, url: &str) {
        let mut entries = self.load();
        entries.insert(
            file_key.to_string(),
            BlobEntry {
                url: url.to_string(),
                timestamp: Utc::now(),
            },
        );
        self.save(&entries);
    }

    /// The recorded URL for a file key, if still within retention.
    pub fn url_for(&self, file_key: &str) -> Option<String> {
        let entries = self.load();
        let entry = entries.get(file_key)?;
        if expired(entry, Utc::now()) {
            return None;
        }
        Some(entry.url.clone())
    }

    /// Drop every entry older than the retention window and return the
    /// URLs that can now be revoked.
    pub fn cleanup_expired(&self) -> Vec<String> {
        let entries = self.load();
        let now = Utc::now();

        let (kept, dropped): (HashMap<_, _>, HashMap<_, _>) = entries
            .into_iter()
            .partition(|(_, entry)| !expired(entry, now));

        if dropped.is_empty() {
            return Vec::new();
        }

        debug!("dropping {} expired blob urls", dropped.len());
        self.save(&kept);
        dropped.into_values().map(|entry| entry.url).collect()
    }

    fn load(&self) -> HashMap<String, BlobEntry> {
        let Some(raw) = self.store.get(STORAGE_KEY) else {
            return HashMap::new();
        };
        // Malformed bookkeeping resets to empty; the URLs leak until the
        // next session ends, which is the price of never blocking the UI.
        serde_json::from_str(&raw).unwrap_or_default()
    }

    fn save(&self, entries: &HashMap<String, BlobEntry>) {
        match serde_json::to_string(entries) {
            Ok(json) => self.store.set(STORAGE_KEY, &json),
            Err(err) => debug!("blob url bookkeeping serialization failed: {err}"),
        }
    }
}

fn expired(entry: &BlobEntry, now: DateTime<Utc>) -> bool {
    now - entry.timestamp > Duration::hours(RETENTION_HOURS)
}
