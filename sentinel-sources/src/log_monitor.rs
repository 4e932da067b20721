use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use sentinel_bus::{Event, EventBus, EventPriority, Payload, PayloadValue};
use sentinel_logging::LogLevel;
use sentinel_telemetry::SentinelTelemetry;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::SourceError;

fn default_window_seconds() -> i64 {
    60
}
fn default_threshold_count() -> usize {
    1
}
fn default_priority() -> EventPriority {
    EventPriority::High
}

/// Configuration for one log file monitor.
#[derive(Debug, Clone)]
pub struct LogMonitorConfig {
    /// Unique identifier.
    pub id: String,
    /// Log file path.
    pub path: String,
    /// Patterns to search each new line for. A `regex:` prefix compiles
    /// the remainder as a regular expression; anything else is matched
    /// literally.
    pub patterns: Vec<String>,
    /// Sliding window, in seconds, over which matches accumulate.
    pub window_seconds: i64,
    /// Matches within the window required to emit an event.
    pub threshold_count: usize,
    /// Priority of emitted events.
    pub priority: EventPriority,
}

impl LogMonitorConfig {
    /// Builds a config with default window, threshold, and priority.
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            patterns,
            window_seconds: default_window_seconds(),
            threshold_count: default_threshold_count(),
            priority: default_priority(),
        }
    }
}

/// A single pattern match in a log file.
#[derive(Debug, Clone)]
pub struct LogMatch {
    /// The original (uncompiled) pattern text that matched.
    pub pattern: String,
    /// The matching line, verbatim.
    pub line: String,
    /// 1-based line number within the file.
    pub line_number: u64,
    /// When the match was observed.
    pub timestamp: DateTime<Utc>,
}

fn compile_pattern(pattern: &str) -> Result<Regex, SourceError> {
    let source = pattern
        .strip_prefix("regex:")
        .map_or_else(|| regex::escape(pattern), str::to_string);
    Regex::new(&source).map_err(|source| SourceError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

struct FilePosition {
    byte_offset: u64,
    next_line_number: u64,
}

struct MonitorState {
    config: LogMonitorConfig,
    patterns: Vec<(String, Regex)>,
    recent_matches: VecDeque<LogMatch>,
}

struct Inner {
    event_bus: EventBus,
    poll_interval: Duration,
    monitors: RwLock<IndexMap<String, MonitorState>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    file_positions: RwLock<HashMap<String, FilePosition>>,
    telemetry: Option<SentinelTelemetry>,
}

/// Tails configured log files for new lines, matches each line against
/// registered patterns, and emits a `log_pattern` event once matches
/// within the sliding window reach the configured threshold.
///
/// Only newly-appended bytes are read and line-numbered on each poll;
/// the file is never rescanned from the start, even after computing
/// line numbers for events.
#[derive(Clone)]
pub struct LogMonitor {
    inner: Arc<Inner>,
}

impl LogMonitor {
    /// Builds a monitor polling every second.
    #[must_use]
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_config(event_bus, Duration::from_secs(1), None)
    }

    /// Builds a monitor polling at the given interval, with an optional
    /// telemetry handle.
    #[must_use]
    pub fn with_config(
        event_bus: EventBus,
        poll_interval: Duration,
        telemetry: Option<SentinelTelemetry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                event_bus,
                poll_interval,
                monitors: RwLock::new(IndexMap::new()),
                running: AtomicBool::new(false),
                task: Mutex::new(None),
                file_positions: RwLock::new(HashMap::new()),
                telemetry,
            }),
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(telemetry) = &self.inner.telemetry {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    /// Starts the polling loop, seeding file positions at end-of-file
    /// for every configured monitor. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let paths: Vec<String> = self
            .inner
            .monitors
            .read()
            .values()
            .map(|state| state.config.path.clone())
            .collect();
        for path in &paths {
            self.init_file_position(path);
        }

        let monitor = self.clone();
        let handle = tokio::spawn(async move { monitor.poll_loop().await });
        *self.inner.task.lock() = Some(handle);

        self.log(
            LogLevel::Info,
            "log_monitor.started",
            serde_json::json!({ "monitor_count": paths.len() }),
        );
    }

    /// Stops the polling loop.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.task.lock().take() {
            handle.abort();
            let _ = handle.await;
        }
        self.log(LogLevel::Info, "log_monitor.stopped", serde_json::json!({}));
    }

    fn init_file_position(&self, path: &str) {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let lines_so_far = count_lines(path);
        self.inner.file_positions.write().insert(
            path.to_string(),
            FilePosition { byte_offset: size, next_line_number: lines_so_far },
        );
    }

    /// Registers a monitor, compiling its patterns. Fails if any
    /// pattern is an invalid regular expression.
    pub fn add_monitor(&self, config: LogMonitorConfig) -> Result<(), SourceError> {
        let compiled = config
            .patterns
            .iter()
            .map(|pattern| compile_pattern(pattern).map(|regex| (pattern.clone(), regex)))
            .collect::<Result<Vec<_>, _>>()?;

        let id = config.id.clone();
        let path = config.path.clone();
        if self.is_running() {
            self.init_file_position(&path);
        }

        self.inner.monitors.write().insert(
            id,
            MonitorState { config, patterns: compiled, recent_matches: VecDeque::new() },
        );

        self.log(
            LogLevel::Info,
            "log_monitor.monitor_added",
            serde_json::json!({ "path": path }),
        );
        Ok(())
    }

    /// Removes a monitor. Returns `false` if the id was unknown.
    pub fn remove_monitor(&self, config_id: &str) -> bool {
        let mut monitors = self.inner.monitors.write();
        let Some(state) = monitors.shift_remove(config_id) else {
            return false;
        };
        self.inner.file_positions.write().remove(&state.config.path);
        true
    }

    async fn poll_loop(&self) {
        while self.inner.running.load(Ordering::SeqCst) {
            self.check_all_logs();
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }

    fn check_all_logs(&self) {
        let ids: Vec<String> = self.inner.monitors.read().keys().cloned().collect();
        for id in ids {
            self.check_log(&id);
        }
    }

    fn check_log(&self, config_id: &str) {
        let path = {
            let monitors = self.inner.monitors.read();
            let Some(state) = monitors.get(config_id) else { return };
            state.config.path.clone()
        };

        if !Path::new(&path).exists() {
            return;
        }

        let current_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let (mut last_position, mut next_line_number) = {
            let positions = self.inner.file_positions.read();
            positions
                .get(&path)
                .map_or((0, 0), |p| (p.byte_offset, p.next_line_number))
        };

        if current_size < last_position {
            last_position = 0;
            next_line_number = 0;
        }

        if current_size == last_position {
            return;
        }

        let Ok(mut file) = File::open(&path) else { return };
        if file.seek(SeekFrom::Start(last_position)).is_err() {
            return;
        }
        let mut buf = Vec::new();
        if file.read_to_end(&mut buf).is_err() {
            return;
        }
        let new_content = String::from_utf8_lossy(&buf).into_owned();
        let new_position = last_position + buf.len() as u64;

        for line in new_content.lines() {
            next_line_number += 1;
            self.check_line(config_id, line, next_line_number);
        }

        self.inner.file_positions.write().insert(
            path,
            FilePosition { byte_offset: new_position, next_line_number },
        );
    }

    fn check_line(&self, config_id: &str, line: &str, line_number: u64) {
        let matched = {
            let monitors = self.inner.monitors.read();
            let Some(state) = monitors.get(config_id) else { return };
            state
                .patterns
                .iter()
                .find(|(_, regex)| regex.is_match(line))
                .map(|(pattern, _)| pattern.clone())
        };

        if let Some(pattern) = matched {
            self.record_match(
                config_id,
                LogMatch { pattern, line: line.to_string(), line_number, timestamp: Utc::now() },
            );
        }
    }

    fn record_match(&self, config_id: &str, new_match: LogMatch) {
        let emitted = {
            let mut monitors = self.inner.monitors.write();
            let Some(state) = monitors.get_mut(config_id) else { return };

            state.recent_matches.push_back(new_match);

            let cutoff = Utc::now() - chrono::Duration::seconds(state.config.window_seconds);
            while state.recent_matches.front().is_some_and(|m| m.timestamp < cutoff) {
                state.recent_matches.pop_front();
            }

            if state.recent_matches.len() >= state.config.threshold_count {
                let matches: Vec<LogMatch> = state.recent_matches.drain(..).collect();
                Some((state.config.clone(), matches))
            } else {
                None
            }
        };

        if let Some((config, matches)) = emitted {
            self.emit_event(&config, &matches);
        }
    }

    fn emit_event(&self, config: &LogMonitorConfig, matches: &[LogMatch]) {
        let sample_lines: Vec<PayloadValue> = matches
            .iter()
            .take(5)
            .map(|m| PayloadValue::String(m.line.clone()))
            .collect();

        let mut patterns_matched = Vec::new();
        for m in matches {
            if !patterns_matched.contains(&m.pattern) {
                patterns_matched.push(m.pattern.clone());
            }
        }

        let mut payload = Payload::new();
        payload.insert("monitor_id".to_string(), config.id.clone().into());
        payload.insert("path".to_string(), config.path.clone().into());
        payload.insert("match_count".to_string(), PayloadValue::Int(matches.len() as i64));
        payload.insert(
            "patterns_matched".to_string(),
            PayloadValue::Array(patterns_matched.into_iter().map(PayloadValue::String).collect()),
        );
        payload.insert("sample_lines".to_string(), PayloadValue::Array(sample_lines));
        payload.insert("window_seconds".to_string(), PayloadValue::Int(config.window_seconds));

        let event = Event::new(
            "log_pattern",
            format!("log_monitor:{}", config.id),
            payload,
        )
        .with_priority(config.priority);

        self.inner.event_bus.publish(event);

        self.log(
            LogLevel::Info,
            "log_monitor.pattern_event",
            serde_json::json!({
                "monitor_id": config.id,
                "match_count": matches.len(),
                "window_seconds": config.window_seconds,
            }),
        );
    }

    /// Whether the polling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Snapshot of every monitor's pending-match count.
    #[must_use]
    pub fn get_status(&self) -> LogMonitorStatus {
        let monitors = self.inner.monitors.read();
        let statuses = monitors
            .values()
            .map(|state| {
                (
                    state.config.id.clone(),
                    LogMonitorEntryStatus {
                        path: state.config.path.clone(),
                        patterns: state.config.patterns.clone(),
                        recent_matches: state.recent_matches.len(),
                    },
                )
            })
            .collect();

        LogMonitorStatus {
            running: self.is_running(),
            monitor_count: monitors.len(),
            monitors: statuses,
        }
    }
}

fn count_lines(path: &str) -> u64 {
    let Ok(mut file) = File::open(path) else { return 0 };
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return 0;
    }
    String::from_utf8_lossy(&buf).lines().count() as u64
}

/// Per-monitor status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LogMonitorEntryStatus {
    /// Log file path.
    pub path: String,
    /// Configured patterns.
    pub patterns: Vec<String>,
    /// Matches currently within the sliding window, awaiting threshold.
    pub recent_matches: usize,
}

/// Snapshot of the whole monitor's state.
#[derive(Debug, Clone, Serialize)]
pub struct LogMonitorStatus {
    /// Whether the polling loop is running.
    pub running: bool,
    /// Number of monitors configured.
    pub monitor_count: usize,
    /// Per-monitor status, keyed by monitor id.
    pub monitors: HashMap<String, LogMonitorEntryStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn bus() -> EventBus {
        EventBus::new(sentinel_bus::BusConfig::default())
    }

    #[test]
    fn literal_pattern_is_escaped() {
        let regex = compile_pattern("error (critical)").unwrap();
        assert!(regex.is_match("error (critical) occurred"));
        assert!(!regex.is_match("error XXXXXXXX occurred"));
    }

    #[test]
    fn regex_prefixed_pattern_compiles_raw() {
        let regex = compile_pattern("regex:err(or)?").unwrap();
        assert!(regex.is_match("err"));
        assert!(regex.is_match("error"));
    }

    #[test]
    fn invalid_regex_pattern_is_rejected() {
        assert!(compile_pattern("regex:(unclosed").is_err());
    }

    #[tokio::test]
    async fn threshold_reached_emits_and_clears_matches() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let monitor = LogMonitor::new(bus());
        let config = LogMonitorConfig {
            id: "errors".to_string(),
            path: path.clone(),
            patterns: vec!["ERROR".to_string()],
            window_seconds: 60,
            threshold_count: 2,
            priority: EventPriority::High,
        };
        monitor.add_monitor(config).unwrap();
        monitor.init_file_position(&path);

        {
            let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "ERROR one").unwrap();
            writeln!(f, "INFO fine").unwrap();
        }
        monitor.check_log("errors");
        {
            let monitors = monitor.inner.monitors.read();
            assert_eq!(monitors.get("errors").unwrap().recent_matches.len(), 1);
        }

        {
            let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "ERROR two").unwrap();
        }
        monitor.check_log("errors");
        {
            let monitors = monitor.inner.monitors.read();
            assert_eq!(monitors.get("errors").unwrap().recent_matches.len(), 0);
        }
    }

    #[tokio::test]
    async fn line_numbers_are_incremental_across_polls() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();
        fs::write(&path, "first\nsecond\n").unwrap();

        let monitor = LogMonitor::new(bus());
        monitor.add_monitor(LogMonitorConfig::new("m", path.clone(), vec!["regex:.".to_string()])).unwrap();
        // seed position at 0 so both lines are "new" on first poll
        monitor.inner.file_positions.write().insert(
            path.clone(),
            FilePosition { byte_offset: 0, next_line_number: 0 },
        );
        monitor.check_log("m");

        {
            let positions = monitor.inner.file_positions.read();
            assert_eq!(positions.get(&path).unwrap().next_line_number, 2);
        }

        {
            let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "third").unwrap();
        }
        monitor.check_log("m");
        {
            let positions = monitor.inner.file_positions.read();
            assert_eq!(positions.get(&path).unwrap().next_line_number, 3);
        }
    }
}
