use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Event priority, ordered from most to least urgent. Declaration
/// order doubles as comparison order: `Critical < High < Medium <
/// Low`, matching the `IntEnum` the original system assigns the same
/// ordinals to (`CRITICAL = 0` .. `LOW = 3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventPriority {
    /// Security alerts, system failures.
    Critical,
    /// Service outages, errors.
    High,
    /// Warnings, degraded performance.
    Medium,
    /// Informational, routine events.
    Low,
}

impl EventPriority {
    /// Numeric ordinal matching the original system's `IntEnum` values
    /// (`Critical = 0` .. `Low = 3`).
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl Default for EventPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        };
        f.write_str(label)
    }
}

/// A scalar or structured payload value. Only the scalar variants
/// (`Bool`, `Int`, `Float`, `String`) participate in decision-context
/// building and goal template rendering; structured values are
/// preserved in the event but excluded from those two operations.
/// Dedup-key hashing is not part of this restriction — every payload
/// value, scalar or structured, is coerced to a string there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    /// Absence of a value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Nested array, opaque to hashing/context/templating.
    Array(Vec<PayloadValue>),
    /// Nested object, opaque to hashing/context/templating.
    Object(IndexMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Returns the scalar's display form, or `None` for structured values.
    #[must_use]
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Null | Self::Array(_) | Self::Object(_) => None,
        }
    }

    /// Returns this value's display form unconditionally, stringifying
    /// structured and null values too rather than skipping them. Used
    /// by dedup-key hashing, which coerces every payload entry to a
    /// string the way the original system's implicit `str()` call does.
    #[must_use]
    pub fn coerced_string(&self) -> String {
        self.as_scalar_string()
            .unwrap_or_else(|| format!("{self:?}"))
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Key-value payload carried by an [`Event`].
pub type Payload = IndexMap<String, PayloadValue>;

/// An event flowing through the bus: the primary communication
/// mechanism between observation sources and the goal/decision
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier.
    pub event_id: Uuid,
    /// Event type (e.g. `http_check`, `file_change`, `log_pattern`).
    pub event_type: String,
    /// Source identifier (e.g. `http_monitor:website-health`).
    pub source: String,
    /// Event payload.
    pub payload: Payload,
    /// Routing priority.
    pub priority: EventPriority,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata, not used by hashing/context/templating.
    #[serde(default)]
    pub metadata: Payload,
    /// Deduplication fingerprint, derived from `event_type`, `source`,
    /// and the sorted, stringified payload entries.
    pub dedup_key: String,
    /// Window, in seconds, during which a repeat of this `dedup_key`
    /// is suppressed.
    pub dedup_window_seconds: i64,
}

impl Event {
    /// Builds a new event with a freshly computed `dedup_key`.
    #[must_use]
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Payload) -> Self {
        let event_type = event_type.into();
        let source = source.into();
        let dedup_key = compute_dedup_key(&event_type, &source, &payload);
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            source,
            payload,
            priority: EventPriority::default(),
            timestamp: Utc::now(),
            metadata: Payload::new(),
            dedup_key,
            dedup_window_seconds: 60,
        }
    }

    /// Sets the priority, builder-style.
    #[must_use]
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dedup window, builder-style.
    #[must_use]
    pub fn with_dedup_window_seconds(mut self, seconds: i64) -> Self {
        self.dedup_window_seconds = seconds;
        self
    }

    /// Sets metadata, builder-style.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Computes the dedup fingerprint: the first 16 hex characters of the
/// SHA-256 digest of `event_type:source` followed by `:key=value` for
/// every payload entry, in lexicographic key order, with each value
/// coerced to a string regardless of type. Lexicographic ordering
/// makes the key independent of the payload's insertion order; the
/// Python original achieves the same property by calling
/// `sorted(payload.keys())` and stringifying every value with an
/// implicit `str()`.
#[must_use]
pub fn compute_dedup_key(event_type: &str, source: &str, payload: &Payload) -> String {
    let mut content = format!("{event_type}:{source}");
    let mut keys: Vec<&String> = payload.keys().collect();
    keys.sort();
    for key in keys {
        content.push_str(&format!(":{key}={}", payload[key].coerced_string()));
    }
    let digest = Sha256::digest(content.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_urgency() {
        assert!(EventPriority::Critical < EventPriority::High);
        assert!(EventPriority::High < EventPriority::Medium);
        assert!(EventPriority::Medium < EventPriority::Low);
    }

    #[test]
    fn dedup_key_is_insertion_order_independent() {
        let mut a = Payload::new();
        a.insert("b".into(), PayloadValue::Int(2));
        a.insert("a".into(), PayloadValue::Int(1));

        let mut b = Payload::new();
        b.insert("a".into(), PayloadValue::Int(1));
        b.insert("b".into(), PayloadValue::Int(2));

        assert_eq!(
            compute_dedup_key("http_check", "http_monitor:x", &a),
            compute_dedup_key("http_check", "http_monitor:x", &b)
        );
    }

    #[test]
    fn dedup_key_includes_structured_payload_values() {
        let mut with_nested = Payload::new();
        with_nested.insert("a".into(), PayloadValue::Int(1));
        with_nested.insert(
            "nested".into(),
            PayloadValue::Object(IndexMap::from([("x".to_string(), PayloadValue::Int(9))])),
        );

        let mut without_nested = Payload::new();
        without_nested.insert("a".into(), PayloadValue::Int(1));

        assert_ne!(
            compute_dedup_key("t", "s", &with_nested),
            compute_dedup_key("t", "s", &without_nested)
        );
    }

    #[test]
    fn dedup_key_is_16_hex_chars() {
        let key = compute_dedup_key("t", "s", &Payload::new());
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
