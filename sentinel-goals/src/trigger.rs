use indexmap::IndexMap;
use regex::Regex;
use sentinel_bus::{Event, PayloadValue};
use serde::{Deserialize, Serialize};

/// Condition under which a goal's action becomes eligible to run.
///
/// A filter value is matched against the payload field of the same
/// name. A pattern prefixed `regex:` is matched as a regular
/// expression against the field's string form; anything else must
/// equal the field exactly, typed — a filter pattern is always a
/// string, so only a string-valued field can match it, never a bool
/// or number that happens to stringify the same way. A filter on a
/// field the event doesn't carry never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Event type this trigger responds to.
    pub event_type: String,
    /// Payload field filters, `field -> pattern`.
    #[serde(default)]
    pub filter: IndexMap<String, String>,
    /// Minimum seconds between successive matches being actioned.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
}

const fn default_cooldown_seconds() -> i64 {
    60
}

impl Trigger {
    /// Returns whether `event` satisfies this trigger's type and filters.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if event.event_type != self.event_type {
            return false;
        }
        self.filter
            .iter()
            .all(|(field, pattern)| Self::field_matches(event, field, pattern))
    }

    fn field_matches(event: &Event, field: &str, pattern: &str) -> bool {
        let Some(value) = event.payload.get(field) else {
            return false;
        };

        if let Some(expr) = pattern.strip_prefix("regex:") {
            let Some(rendered) = value.as_scalar_string() else {
                return false;
            };
            Regex::new(expr).is_ok_and(|re| re.is_match(&rendered))
        } else {
            matches!(value, PayloadValue::String(s) if s == pattern)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_bus::Payload;

    fn event_with(event_type: &str, field: &str, value: &str) -> Event {
        let mut payload = Payload::new();
        payload.insert(field.to_string(), value.into());
        Event::new(event_type, "test", payload)
    }

    #[test]
    fn exact_filter_requires_exact_match() {
        let trigger = Trigger {
            event_type: "http_check".into(),
            filter: IndexMap::from([("status".to_string(), "down".to_string())]),
            cooldown_seconds: 60,
        };
        assert!(trigger.matches(&event_with("http_check", "status", "down")));
        assert!(!trigger.matches(&event_with("http_check", "status", "up")));
    }

    #[test]
    fn regex_filter_matches_pattern() {
        let trigger = Trigger {
            event_type: "log_pattern".into(),
            filter: IndexMap::from([("line".to_string(), "regex:^ERROR.*timeout$".to_string())]),
            cooldown_seconds: 0,
        };
        assert!(trigger.matches(&event_with("log_pattern", "line", "ERROR connection timeout")));
        assert!(!trigger.matches(&event_with("log_pattern", "line", "INFO all good")));
    }

    #[test]
    fn exact_filter_does_not_coerce_non_string_values() {
        let trigger = Trigger {
            event_type: "http_check".into(),
            filter: IndexMap::from([("ok".to_string(), "true".to_string())]),
            cooldown_seconds: 60,
        };
        let mut payload = Payload::new();
        payload.insert("ok".to_string(), PayloadValue::Bool(true));
        let event = Event::new("http_check", "test", payload);

        assert!(!trigger.matches(&event));
    }

    #[test]
    fn missing_field_never_matches() {
        let trigger = Trigger {
            event_type: "http_check".into(),
            filter: IndexMap::from([("status".to_string(), "down".to_string())]),
            cooldown_seconds: 60,
        };
        assert!(!trigger.matches(&Event::new("http_check", "test", Payload::new())));
    }
}
