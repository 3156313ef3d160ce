//! Persisted stream metadata
//!
//! The durable record that a chat has a generation in flight. Written
//! when a stream starts, removed on completion, failure, explicit stop,
//! or staleness detection. All entries live under one storage key as a
//! JSON array, ordered by first registration, matching the format the
//! web client persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::KeyValueStore;

const METADATA_KEY: &str = "active_stream_metadata";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    pub chat_id: String,
    pub message_id: String,
    pub start_time: DateTime<Utc>,
}

pub(crate) fn load_metadata(store: &dyn KeyValueStore) -> Vec<StreamMetadata> {
    let Some(raw) = store.get(METADATA_KEY) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("corrupt stream metadata, discarding: {err}");
            store.remove(METADATA_KEY);
            Vec::new()
        }
    }
}

fn save_metadata(store: &dyn KeyValueStore, entries: &[StreamMetadata]) {
    match serde_json::to_string(entries) {
        Ok(json) => store.set(METADATA_KEY, &json),
        Err(err) => warn!("stream metadata serialization failed: {err}"),
    }
}

/// Replace the entry for the metadata's chat, or append one. At most one
/// entry exists per chat.
pub(crate) fn upsert_metadata(store: &dyn KeyValueStore, entry: StreamMetadata) {
    let mut entries = load_metadata(store);
    match entries.iter_mut().find(|item| item.chat_id == entry.chat_id) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
    save_metadata(store, &entries);
}

pub(crate) fn remove_metadata(store: &dyn KeyValueStore, chat_id: &str) {
    let mut entries = load_metadata(store);
    let before = entries.len();
    entries.retain(|item| item.chat_id != chat_id);
    if entries.len() != before {
        save_metadata(store, &entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn meta(chat_id: &str, message_id: &str) -> StreamMetadata {
        StreamMetadata {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            start_time: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_replaces_entry_for_same_chat() {
        let store = MemoryStore::new();
        upsert_metadata(&store, meta("c1", "m1"));
        upsert_metadata(&store, meta("c2", "m2"));
        upsert_metadata(&store, meta("c1", "m3"));

        let entries = load_metadata(&store);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].chat_id, "c1");
        assert_eq!(entries[0].message_id, "m3");
        assert_eq!(entries[1].chat_id, "c2");
    }

    #[test]
    fn test_remove_is_a_noop_for_unknown_chat() {
        let store = MemoryStore::new();
        upsert_metadata(&store, meta("c1", "m1"));
        remove_metadata(&store, "c9");
        remove_metadata(&store, "c1");
        assert!(load_metadata(&store).is_empty());
    }

    #[test]
    fn test_corrupt_metadata_is_discarded() {
        let store = MemoryStore::new();
        store.set(METADATA_KEY, "[{broken");
        assert!(load_metadata(&store).is_empty());
        assert_eq!(store.get(METADATA_KEY), None);
    }

    #[test]
    fn test_persisted_form_uses_camel_case_keys() {
        let store = MemoryStore::new();
        upsert_metadata(&store, meta("c1", "m1"));
        let raw = store.get(METADATA_KEY).unwrap();
        assert!(raw.contains("\"chatId\":\"c1\""));
        assert!(raw.contains("\"messageId\":\"m1\""));
        assert!(raw.contains("\"startTime\""));
    }
}
