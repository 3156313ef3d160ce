//! Event log codec
//!
//! Converts between the persisted message-content string and an ordered
//! event sequence, with a memoizing parse cache. Parsing never fails:
//! content that is not a well-formed event array is interpreted as a
//! single literal text event, which keeps pre-event-log messages readable.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, error};

use super::events::StreamEvent;

/// Default number of parse results kept in the cache.
const PARSE_CACHE_CAPACITY: usize = 100;

/// Content at or below this length is its own cache key.
const FINGERPRINT_THRESHOLD: usize = 100;

/// Prefix/suffix slice length used to fingerprint long content.
const FINGERPRINT_SLICE: usize = 50;

/// Input to text extraction: either raw persisted content or an
/// already-parsed event slice.
pub enum LogSource<'a> {
    Raw(&'a str),
    Events(&'a [StreamEvent]),
}

impl<'a> From<&'a str> for LogSource<'a> {
    fn from(content: &'a str) -> Self {
        LogSource::Raw(content)
    }
}

impl<'a> From<&'a [StreamEvent]> for LogSource<'a> {
    fn from(events: &'a [StreamEvent]) -> Self {
        LogSource::Events(events)
    }
}

impl<'a> From<&'a Vec<StreamEvent>> for LogSource<'a> {
    fn from(events: &'a Vec<StreamEvent>) -> Self {
        LogSource::Events(events.as_slice())
    }
}

struct CacheEntry {
    content: String,
    events: Vec<StreamEvent>,
}

/// Pure memoization layer over `parse_uncached`. Eviction is strictly
/// insertion-order once capacity is exceeded; a hit additionally requires
/// literal content equality because fingerprints of long strings are
/// truncations, not collision-free digests.
struct ParseCache {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ParseCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &str, content: &str) -> Option<Vec<StreamEvent>> {
        self.entries
            .get(key)
            .filter(|entry| entry.content == content)
            .map(|entry| entry.events.clone())
    }

    fn insert(&mut self, key: String, content: String, events: Vec<StreamEvent>) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, CacheEntry { content, events });
    }
}

/// Codec for the persisted event log.
///
/// Constructed explicitly and shared via `Arc`; the cache is interior
/// state behind a mutex, never a module-level global.
pub struct EventLogCodec {
    cache: Mutex<ParseCache>,
}

impl Default for EventLogCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogCodec {
    pub fn new() -> Self {
        Self::with_cache_capacity(PARSE_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(ParseCache::new(capacity)),
        }
    }

    /// Parse persisted content into its event sequence.
    ///
    /// Empty or absent content yields an empty sequence. Content that is
    /// not a JSON event array (legacy plain text, malformed JSON, array
    /// elements without a known `type`) yields exactly one
    /// `assistant_text` event carrying the content verbatim. No error
    /// escapes this function.
    pub fn parse(&self, content: Option<&str>) -> Vec<StreamEvent> {
        let Some(content) = content else {
            return Vec::new();
        };
        if content.trim().is_empty() {
            return Vec::new();
        }

        let key = fingerprint(content);
        {
            let cache = self.cache.lock();
            if let Some(events) = cache.get(&key, content) {
                return events;
            }
        }

        let events = parse_uncached(content);
        self.cache
            .lock()
            .insert(key, content.to_string(), events.clone());
        events
    }

    /// Append one event to persisted content, returning the new persisted
    /// form. The whole sequence is re-serialized: the storage schema is a
    /// single text column, so appends are O(n) in log length.
    pub fn append(&self, content: Option<&str>, event: StreamEvent) -> String {
        let mut events = self.parse(content);
        events.push(event);
        Self::serialize(&events)
    }

    /// The JSON-array persisted form of an event sequence.
    pub fn serialize(events: &[StreamEvent]) -> String {
        serde_json::to_string(events).unwrap_or_else(|err| {
            error!("event log serialization failed: {err}");
            String::from("[]")
        })
    }

    /// Concatenated text of every `assistant_text` event, in order.
    pub fn extract_assistant_text<'a>(&self, source: impl Into<LogSource<'a>>) -> String {
        self.collect_text(source.into(), |event| match event {
            StreamEvent::AssistantText { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Concatenated text of every `user_text` event, in order. Used when
    /// echoing a persisted user prompt back out of its log form.
    pub fn extract_user_text<'a>(&self, source: impl Into<LogSource<'a>>) -> String {
        self.collect_text(source.into(), |event| match event {
            StreamEvent::UserText { text } => Some(text.as_str()),
            _ => None,
        })
    }

    fn collect_text(
        &self,
        source: LogSource<'_>,
        pick: impl Fn(&StreamEvent) -> Option<&str>,
    ) -> String {
        match source {
            LogSource::Raw(content) => self
                .parse(Some(content))
                .iter()
                .filter_map(&pick)
                .collect(),
            LogSource::Events(events) => events.iter().filter_map(&pick).collect(),
        }
    }
}

fn parse_uncached(content: &str) -> Vec<StreamEvent> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // Legacy messages persisted plain text, not an event array.
    if !trimmed.starts_with('[') {
        return vec![StreamEvent::AssistantText {
            text: content.to_string(),
        }];
    }

    match serde_json::from_str::<Vec<StreamEvent>>(trimmed) {
        Ok(events) => events,
        Err(err) => {
            debug!("event log parse fell back to plain text: {err}");
            vec![StreamEvent::AssistantText {
                text: content.to_string(),
            }]
        }
    }
}

/// Cheap cache key: short content is its own key; long content keys on
/// length plus prefix/suffix slices so very large payloads are never
/// hashed in full. Slice offsets are clamped to char boundaries.
fn fingerprint(content: &str) -> String {
    if content.len() <= FINGERPRINT_THRESHOLD {
        return content.to_string();
    }
    let head = floor_char_boundary(content, FINGERPRINT_SLICE);
    let tail = ceil_char_boundary(content, content.len() - FINGERPRINT_SLICE);
    format!("{}:{}:{}", content.len(), &content[..head], &content[tail..])
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::events::{ToolPayload, ToolStatus};

    fn text(s: &str) -> StreamEvent {
        StreamEvent::AssistantText {
            text: s.to_string(),
        }
    }

    #[test]
    fn test_parse_empty_and_none() {
        let codec = EventLogCodec::new();
        assert!(codec.parse(None).is_empty());
        assert!(codec.parse(Some("")).is_empty());
        assert!(codec.parse(Some("   \n  ")).is_empty());
    }

    #[test]
    fn test_parse_plain_text_is_single_event() {
        let codec = EventLogCodec::new();
        let events = codec.parse(Some("Hello there"));
        assert_eq!(events, vec![text("Hello there")]);
    }

    #[test]
    fn test_parse_preserves_untrimmed_legacy_content() {
        let codec = EventLogCodec::new();
        // The event carries the content verbatim, not the trimmed form.
        let events = codec.parse(Some("  leading and trailing  "));
        assert_eq!(events, vec![text("  leading and trailing  ")]);
    }

    #[test]
    fn test_parse_malformed_json_falls_back() {
        let codec = EventLogCodec::new();
        let raw = "[{\"type\": \"assistant_text\", \"text\": ";
        assert_eq!(codec.parse(Some(raw)), vec![text(raw)]);
    }

    #[test]
    fn test_parse_unknown_type_falls_back() {
        let codec = EventLogCodec::new();
        // Missing required tool fields / unknown discriminator: policy is
        // to treat the whole string as one literal text event.
        let raw = "[{\"type\":\"tool\"}]";
        assert_eq!(codec.parse(Some(raw)), vec![text(raw)]);
    }

    #[test]
    fn test_parse_array_without_type_falls_back() {
        let codec = EventLogCodec::new();
        let raw = "[{\"text\":\"no discriminator\"}]";
        assert_eq!(codec.parse(Some(raw)), vec![text(raw)]);
    }

    #[test]
    fn test_round_trip_through_serialize() {
        let codec = EventLogCodec::new();
        let mut tool = ToolPayload::new("t1", "bash", "Run command");
        tool.status = Some(ToolStatus::Completed);
        tool.result = Some(serde_json::json!({"exit_code": 0}));

        let events = vec![
            text("Hello, "),
            StreamEvent::ToolCompleted { tool },
            text("world!"),
        ];
        let serialized = EventLogCodec::serialize(&events);
        assert_eq!(codec.parse(Some(&serialized)), events);
    }

    #[test]
    fn test_append_builds_on_existing_log() {
        let codec = EventLogCodec::new();
        let first = codec.append(None, text("Hello, "));
        let second = codec.append(Some(&first), text("world!"));
        let events = codec.parse(Some(&second));
        assert_eq!(events, vec![text("Hello, "), text("world!")]);
    }

    #[test]
    fn test_append_legacy_content_keeps_it_as_first_event() {
        let codec = EventLogCodec::new();
        let log = codec.append(Some("plain old message"), text(" and more"));
        let events = codec.parse(Some(&log));
        assert_eq!(events, vec![text("plain old message"), text(" and more")]);
    }

    #[test]
    fn test_extract_assistant_text_skips_tool_events() {
        let codec = EventLogCodec::new();
        let events = vec![
            text("Hello, "),
            StreamEvent::ToolStarted {
                tool: ToolPayload::new("t1", "read", "Read file"),
            },
            text("world!"),
        ];
        assert_eq!(codec.extract_assistant_text(&events), "Hello, world!");

        let serialized = EventLogCodec::serialize(&events);
        assert_eq!(
            codec.extract_assistant_text(serialized.as_str()),
            "Hello, world!"
        );
    }

    #[test]
    fn test_extract_user_text() {
        let codec = EventLogCodec::new();
        let events = vec![
            StreamEvent::UserText {
                text: "fix the ".to_string(),
            },
            text("assistant noise"),
            StreamEvent::UserText {
                text: "bug".to_string(),
            },
        ];
        assert_eq!(codec.extract_user_text(&events), "fix the bug");
    }

    #[test]
    fn test_cache_returns_copies() {
        let codec = EventLogCodec::new();
        let mut events = codec.parse(Some("hello"));
        events.push(text("mutated"));
        // The mutation above must not be visible on the next parse.
        assert_eq!(codec.parse(Some("hello")), vec![text("hello")]);
    }

    #[test]
    fn test_cache_evicts_oldest_inserted_first() {
        let codec = EventLogCodec::with_cache_capacity(2);
        codec.parse(Some("first"));
        codec.parse(Some("second"));
        codec.parse(Some("third")); // evicts "first"

        // Evicted content is recomputed and yields identical output.
        assert_eq!(codec.parse(Some("first")), vec![text("first")]);
        assert_eq!(codec.parse(Some("second")), vec![text("second")]);
        assert_eq!(codec.parse(Some("third")), vec![text("third")]);
    }

    #[test]
    fn test_fingerprint_collision_verified_by_content() {
        let codec = EventLogCodec::new();
        // Same length, prefix, and suffix; different middles. The
        // fingerprints collide, so the cache must fall back to literal
        // content comparison.
        let prefix = "x".repeat(60);
        let suffix = "y".repeat(60);
        let a = format!("{prefix}AAAA{suffix}");
        let b = format!("{prefix}BBBB{suffix}");
        assert_eq!(fingerprint(&a), fingerprint(&b));

        assert_eq!(codec.parse(Some(&a)), vec![text(&a)]);
        assert_eq!(codec.parse(Some(&b)), vec![text(&b)]);
        assert_eq!(codec.parse(Some(&a)), vec![text(&a)]);
    }

    #[test]
    fn test_fingerprint_respects_char_boundaries() {
        // 3-byte chars put both slice offsets mid-char; the fingerprint
        // must clamp instead of panicking.
        let content = "→".repeat(120);
        let codec = EventLogCodec::new();
        assert_eq!(codec.parse(Some(&content)), vec![text(&content)]);
        assert!(fingerprint(&content).starts_with(&format!("{}:", content.len())));
    }
}
