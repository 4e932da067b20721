use regex::Regex;
use sentinel_bus::{Event, PayloadValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What kind of side effect a goal's action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Run a local command.
    Shell,
    /// Send a message to an operator channel.
    Notify,
    /// Issue an HTTP request.
    Http,
    /// Hand a prompt to an agent for free-form handling.
    Agent,
}

impl ActionType {
    /// The lowercase name used as an action-type key everywhere
    /// outside this struct: learning-engine lookups, executor
    /// dispatch, audit log grouping.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Notify => "notify",
            Self::Http => "http",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A goal's action, with fields that may contain `{{ event.path }}`
/// placeholders resolved against the triggering event.
///
/// Placeholders are resolved by walking a nested `{event: {type,
/// source, priority, id, payload}}` map — never by evaluating an
/// expression — split on `.` and `[...]` (e.g. `event.source`,
/// `event.payload.status`, `event.payload[status]` are all
/// equivalent). Only scalar payload fields appear under `event.payload`;
/// structured entries are omitted. A placeholder that doesn't resolve
/// is left in the rendered text unchanged, the same way a missing
/// format argument would be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// The kind of action.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Shell command template (`Shell`).
    pub command: Option<String>,
    /// Prompt template handed to an agent (`Agent`).
    pub agent_prompt: Option<String>,
    /// Request URL template (`Http`).
    pub url: Option<String>,
    /// Request method (`Http`).
    #[serde(default = "default_method")]
    pub method: String,
    /// Request body (`Http`).
    pub body: Option<serde_json::Value>,
    /// Notification channel (`Notify`).
    pub channel: Option<String>,
    /// Notification message template (`Notify`).
    pub message: Option<String>,
    /// Execution timeout, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Number of attempts, including the first.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delay between attempts, in seconds.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

const fn default_method() -> String {
    String::new()
}
const fn default_timeout_seconds() -> u64 {
    60
}
const fn default_retry_count() -> u32 {
    1
}
const fn default_retry_delay_seconds() -> u64 {
    5
}

impl Action {
    /// Renders `command`, `agent_prompt`, `url`, and `message` against
    /// the triggering event, returning a copy with placeholders
    /// substituted.
    #[must_use]
    pub fn render(&self, event: &Event) -> Self {
        let context = build_context(event);
        Self {
            action_type: self.action_type,
            command: self.command.as_deref().map(|t| render_template(t, &context)),
            agent_prompt: self
                .agent_prompt
                .as_deref()
                .map(|t| render_template(t, &context)),
            url: self.url.as_deref().map(|t| render_template(t, &context)),
            method: self.method.clone(),
            body: self.body.clone(),
            channel: self.channel.clone(),
            message: self.message.as_deref().map(|t| render_template(t, &context)),
            timeout_seconds: self.timeout_seconds,
            retry_count: self.retry_count,
            retry_delay_seconds: self.retry_delay_seconds,
        }
    }
}

/// Nested lookup tree used to resolve `{{ event.path }}` placeholders,
/// mirroring the `{"event": {...}}` context the original system
/// builds before evaluating a goal's templates.
fn build_context(event: &Event) -> Value {
    let mut payload = serde_json::Map::new();
    for (key, value) in &event.payload {
        if let Some(scalar) = scalar_payload_value(value) {
            payload.insert(key.clone(), scalar);
        }
    }
    json!({
        "event": {
            "type": event.event_type,
            "source": event.source,
            "priority": event.priority.to_string(),
            "id": event.event_id.to_string(),
            "payload": payload,
        }
    })
}

fn scalar_payload_value(value: &PayloadValue) -> Option<Value> {
    match value {
        PayloadValue::Bool(b) => Some(Value::Bool(*b)),
        PayloadValue::Int(i) => Some(json!(i)),
        PayloadValue::Float(f) => Some(json!(f)),
        PayloadValue::String(s) => Some(Value::String(s.clone())),
        PayloadValue::Null | PayloadValue::Array(_) | PayloadValue::Object(_) => None,
    }
}

fn template_regex() -> Regex {
    Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("static template pattern is valid")
}

/// Splits a `{{ }}` expression body on `.` and `[...]` into the path
/// segments it names — `event.payload.status` and
/// `event.payload[status]` both yield `["event", "payload", "status"]`.
fn parse_path(expr: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = expr.chars();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let key: String = chars.by_ref().take_while(|&c2| c2 != ']').collect();
                segments.push(key.trim_matches(['\'', '"']).to_string());
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Walks `context` along `path`'s segments, returning the final
/// value's scalar string form, or `None` if the path doesn't resolve
/// to a scalar.
fn resolve_path(context: &Value, path: &str) -> Option<String> {
    let mut current = context;
    for segment in parse_path(path) {
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn render_template(template: &str, context: &Value) -> String {
    let re = template_regex();
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        let key = caps[1].trim();
        resolve_path(context, key).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
