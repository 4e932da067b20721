use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use glob::Pattern;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use sentinel_bus::{Event, EventBus, EventPriority, Payload};
use sentinel_logging::LogLevel;
use sentinel_telemetry::SentinelTelemetry;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

fn default_patterns() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_events() -> Vec<String> {
    vec!["created".to_string(), "modified".to_string(), "deleted".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_debounce_seconds() -> f64 {
    1.0
}

/// The kind of filesystem change a watcher observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventType {
    /// A new file matching the watcher's patterns appeared.
    Created,
    /// An existing file's size or modification time changed.
    Modified,
    /// A previously-seen file is gone.
    Deleted,
}

impl FileEventType {
    /// Lowercase name, matching the original system's string values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one directory watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Unique identifier.
    pub id: String,
    /// Directory to watch.
    pub path: String,
    /// Filename glob patterns a file must match to be tracked.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Which event kinds to emit: any of `created`, `modified`, `deleted`.
    #[serde(default = "default_events")]
    pub events: Vec<String>,
    /// Whether to descend into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Seconds to wait after a change before emitting, coalescing bursts.
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: f64,
    /// Glob patterns (matched against filename or full path) to exclude.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

impl WatchConfig {
    fn watches(&self, event_type: FileEventType) -> bool {
        self.events.iter().any(|e| e == event_type.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FileState {
    mtime: f64,
    size: u64,
}

fn matches_any(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        Pattern::new(pattern).map_or(name == pattern, |glob| glob.matches(name))
    })
}

fn matches_ignore(name: &str, full_path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        Pattern::new(pattern).map_or(false, |glob| glob.matches(name) || glob.matches(full_path))
    })
}

fn scan_directory(config: &WatchConfig) -> HashMap<PathBuf, FileState> {
    let mut states = HashMap::new();
    let root = Path::new(&config.path);
    if !root.exists() {
        return states;
    }

    let max_depth = if config.recursive { usize::MAX } else { 1 };
    for entry in WalkDir::new(root).max_depth(max_depth).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !matches_any(name, &config.patterns) {
            continue;
        }
        let full_path = entry.path().to_string_lossy().into_owned();
        if matches_ignore(name, &full_path, &config.ignore_patterns) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());
        states.insert(
            entry.path().to_path_buf(),
            FileState { mtime, size: metadata.len() },
        );
    }
    states
}

struct Inner {
    event_bus: EventBus,
    poll_interval: Duration,
    configs: RwLock<IndexMap<String, WatchConfig>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    file_states: RwLock<HashMap<String, HashMap<PathBuf, FileState>>>,
    pending_events: Mutex<IndexMap<String, (DateTime<Utc>, Event)>>,
    telemetry: Option<SentinelTelemetry>,
}

/// Polls configured directories for created, modified, and deleted
/// files, debouncing bursts of change before publishing to the bus.
#[derive(Clone)]
pub struct FileWatcher {
    inner: Arc<Inner>,
}

impl FileWatcher {
    /// Builds a watcher polling every second.
    #[must_use]
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_config(event_bus, Duration::from_secs(1), None)
    }

    /// Builds a watcher polling at the given interval, with an optional
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
                configs: RwLock::new(IndexMap::new()),
                running: AtomicBool::new(false),
                task: Mutex::new(None),
                file_states: RwLock::new(HashMap::new()),
                pending_events: Mutex::new(IndexMap::new()),
                telemetry,
            }),
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(telemetry) = &self.inner.telemetry {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    /// Starts the polling loop, seeding initial file states for every
    /// configured watcher. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let configs: Vec<WatchConfig> = self.inner.configs.read().values().cloned().collect();
        {
            let mut states = self.inner.file_states.write();
            for config in &configs {
                states.insert(config.id.clone(), scan_directory(config));
            }
        }

        let watcher = self.clone();
        let handle = tokio::spawn(async move { watcher.poll_loop().await });
        *self.inner.task.lock() = Some(handle);

        self.log(
            LogLevel::Info,
            "file_watcher.started",
            serde_json::json!({ "watcher_count": configs.len() }),
        );
    }

    /// Stops the polling loop.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.task.lock().take() {
            handle.abort();
            let _ = handle.await;
        }
        self.log(LogLevel::Info, "file_watcher.stopped", serde_json::json!({}));
    }

    /// Registers a watcher, seeding its initial file state immediately
    /// if the watcher is already running.
    pub fn add_watcher(&self, config: WatchConfig) {
        let id = config.id.clone();
        let path = config.path.clone();
        if self.is_running() {
            self.inner.file_states.write().insert(id.clone(), scan_directory(&config));
        }
        self.inner.configs.write().insert(id, config);

        self.log(
            LogLevel::Info,
            "file_watcher.watcher_added",
            serde_json::json!({ "path": path }),
        );
    }

    /// Removes a watcher. Returns `false` if the id was unknown.
    pub fn remove_watcher(&self, config_id: &str) -> bool {
        if self.inner.configs.write().shift_remove(config_id).is_none() {
            return false;
        }
        self.inner.file_states.write().remove(config_id);
        true
    }

    async fn poll_loop(&self) {
        while self.inner.running.load(Ordering::SeqCst) {
            self.check_all_watchers();
            self.process_pending_events();
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }

    fn check_all_watchers(&self) {
        let configs: Vec<WatchConfig> = self.inner.configs.read().values().cloned().collect();
        for config in &configs {
            self.check_watcher(config);
        }
    }

    fn check_watcher(&self, config: &WatchConfig) {
        let current = scan_directory(config);
        let previous = self
            .inner
            .file_states
            .read()
            .get(&config.id)
            .cloned()
            .unwrap_or_default();

        if config.watches(FileEventType::Created) {
            for path in current.keys() {
                if !previous.contains_key(path) {
                    self.queue_event(config, path, FileEventType::Created);
                }
            }
        }

        if config.watches(FileEventType::Modified) {
            for (path, state) in &current {
                if let Some(prev) = previous.get(path) {
                    if state != prev {
                        self.queue_event(config, path, FileEventType::Modified);
                    }
                }
            }
        }

        if config.watches(FileEventType::Deleted) {
            for path in previous.keys() {
                if !current.contains_key(path) {
                    self.queue_event(config, path, FileEventType::Deleted);
                }
            }
        }

        self.inner.file_states.write().insert(config.id.clone(), current);
    }

    fn queue_event(&self, config: &WatchConfig, path: &Path, event_type: FileEventType) {
        let path_str = path.to_string_lossy().into_owned();
        let key = format!("{}:{path_str}:{}", config.id, event_type.as_str());

        let mut payload = Payload::new();
        payload.insert("watcher_id".to_string(), config.id.clone().into());
        payload.insert("path".to_string(), path_str.into());
        payload.insert("event_type".to_string(), event_type.as_str().into());
        payload.insert("watch_path".to_string(), config.path.clone().into());

        let event = Event::new(
            "file_change",
            format!("file_watcher:{}", config.id),
            payload,
        )
        .with_priority(EventPriority::Medium);

        self.inner
            .pending_events
            .lock()
            .insert(key, (Utc::now(), event));
    }

    fn process_pending_events(&self) {
        let now = Utc::now();
        let configs = self.inner.configs.read();
        let mut to_emit = Vec::new();
        let mut pending = self.inner.pending_events.lock();
        let mut to_remove = Vec::new();

        for (key, (queued_at, event)) in pending.iter() {
            let Some(watcher_id) = event.payload.get("watcher_id").and_then(|v| v.as_scalar_string())
            else {
                to_remove.push(key.clone());
                continue;
            };
            let Some(config) = configs.get(&watcher_id) else {
                to_remove.push(key.clone());
                continue;
            };
            let elapsed = (now - *queued_at).num_milliseconds() as f64 / 1000.0;
            if elapsed >= config.debounce_seconds {
                to_emit.push(event.clone());
                to_remove.push(key.clone());
            }
        }

        for key in &to_remove {
            pending.shift_remove(key);
        }
        drop(pending);
        drop(configs);

        for event in to_emit {
            let event_type = event
                .payload
                .get("event_type")
                .and_then(|v| v.as_scalar_string())
                .unwrap_or_default();
            let path = event
                .payload
                .get("path")
                .and_then(|v| v.as_scalar_string())
                .unwrap_or_default();
            self.inner.event_bus.publish(event);
            self.log(
                LogLevel::Info,
                "file_watcher.file_event",
                serde_json::json!({ "event_type": event_type, "path": path }),
            );
        }
    }

    /// Whether the polling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Snapshot of every watcher's tracked file count.
    #[must_use]
    pub fn get_status(&self) -> FileWatcherStatus {
        let configs = self.inner.configs.read();
        let states = self.inner.file_states.read();
        let watchers = configs
            .values()
            .map(|config| {
                (
                    config.id.clone(),
                    WatcherStatus {
                        path: config.path.clone(),
                        patterns: config.patterns.clone(),
                        file_count: states.get(&config.id).map_or(0, HashMap::len),
                    },
                )
            })
            .collect();

        FileWatcherStatus {
            running: self.is_running(),
            watcher_count: configs.len(),
            watchers,
        }
    }
}

/// Per-watcher status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    /// Directory watched.
    pub path: String,
    /// Active filename patterns.
    pub patterns: Vec<String>,
    /// Files currently tracked.
    pub file_count: usize,
}

/// Snapshot of the whole watcher's state.
#[derive(Debug, Clone, Serialize)]
pub struct FileWatcherStatus {
    /// Whether the polling loop is running.
    pub running: bool,
    /// Number of watchers configured.
    pub watcher_count: usize,
    /// Per-watcher status, keyed by watcher id.
    pub watchers: HashMap<String, WatcherStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread::sleep;

    fn config(id: &str, path: &Path) -> WatchConfig {
        WatchConfig {
            id: id.to_string(),
            path: path.to_string_lossy().into_owned(),
            patterns: vec!["*.log".to_string()],
            events: default_events(),
            recursive: true,
            debounce_seconds: 0.0,
            ignore_patterns: vec![],
        }
    }

    #[test]
    fn pattern_matching_is_fnmatch_style() {
        assert!(matches_any("app.log", &["*.log".to_string()]));
        assert!(!matches_any("app.txt", &["*.log".to_string()]));
        assert!(matches_any("anything", &["*".to_string()]));
    }

    #[test]
    fn ignore_patterns_check_name_and_full_path() {
        let patterns = vec!["*/tmp/*".to_string()];
        assert!(matches_ignore("x", "/var/tmp/x", &patterns));
        assert!(!matches_ignore("x", "/var/data/x", &patterns));
    }

    #[test]
    fn scan_picks_up_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.log"), b"hello").unwrap();
        fs::write(dir.path().join("b.txt"), b"hello").unwrap();

        let cfg = config("w1", dir.path());
        let states = scan_directory(&cfg);
        assert_eq!(states.len(), 1);
        assert!(states.contains_key(&dir.path().join("a.log")));
    }

    #[tokio::test]
    async fn restaging_the_same_event_type_resets_its_debounce_clock() {
        let dir = tempfile::tempdir().unwrap();
        let event_bus = sentinel_bus::EventBus::new(sentinel_bus::BusConfig::default());
        let watcher = FileWatcher::new(event_bus);
        let mut cfg = config("w1", dir.path());
        cfg.debounce_seconds = 1.0;
        watcher.add_watcher(cfg.clone());
        watcher.start();

        // t=0: file created
        fs::write(dir.path().join("a.log"), b"one").unwrap();
        watcher.check_watcher(&cfg);
        let key = format!("w1:{}:modified", dir.path().join("a.log").to_string_lossy());
        let created_key = format!("w1:{}:created", dir.path().join("a.log").to_string_lossy());
        {
            let pending = watcher.inner.pending_events.lock();
            assert!(pending.contains_key(&created_key));
            assert!(!pending.contains_key(&key));
        }

        // t=0.3: appended — restages a fresh "modified" entry
        sleep(Duration::from_millis(50));
        fs::write(dir.path().join("a.log"), b"one-two").unwrap();
        watcher.check_watcher(&cfg);
        let first_queued_at = watcher.inner.pending_events.lock().get(&key).unwrap().0;

        // t=0.6: appended again — same key, timer resets to this later timestamp
        sleep(Duration::from_millis(50));
        fs::write(dir.path().join("a.log"), b"one-two-three").unwrap();
        watcher.check_watcher(&cfg);
        let second_queued_at = watcher.inner.pending_events.lock().get(&key).unwrap().0;

        assert!(second_queued_at > first_queued_at);

        // Not yet past the 1s debounce window relative to the latest write.
        watcher.process_pending_events();
        assert!(watcher.inner.pending_events.lock().contains_key(&key));

        watcher.stop().await;
    }

    #[tokio::test]
    async fn detects_created_modified_and_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let event_bus = sentinel_bus::EventBus::new(sentinel_bus::BusConfig::default());
        let watcher = FileWatcher::new(event_bus);
        let cfg = config("w1", dir.path());
        watcher.add_watcher(cfg.clone());
        watcher.start();

        fs::write(dir.path().join("a.log"), b"hello").unwrap();
        sleep(std::time::Duration::from_millis(20));
        watcher.check_watcher(&cfg);

        {
            let pending = watcher.inner.pending_events.lock();
            assert!(pending.keys().any(|k| k.ends_with(":created")));
        }

        watcher.process_pending_events();
        watcher.stop().await;
    }
}
