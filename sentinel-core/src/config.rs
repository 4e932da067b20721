use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use sentinel_bus::{BusConfig, EventPriority};
use sentinel_sources::{HttpEndpoint, WatchConfig};
use serde::Deserialize;

/// Process-level configuration loaded from a single TOML file: where
/// goal definitions live, how the bus is tuned, where telemetry logs
/// are written, and which observation sources to start.
///
/// Goal documents themselves stay YAML, loaded separately by
/// [`sentinel_goals::GoalManager`] — this file only points at the
/// directories containing them.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directories scanned for `*.yaml` goal files.
    pub goal_dirs: Vec<PathBuf>,
    /// Bus tuning knobs.
    pub bus: BusConfig,
    /// Telemetry log directory, if structured logging is enabled.
    pub telemetry_log_dir: Option<PathBuf>,
    /// HTTP endpoints to monitor.
    pub http_endpoints: Vec<HttpEndpoint>,
    /// Directories to watch for file changes.
    pub file_watchers: Vec<WatchConfig>,
    /// Log files to tail for pattern matches.
    pub log_monitors: Vec<LogMonitorSpec>,
    /// Bounded audit log capacity.
    pub audit_log_capacity: usize,
    source_dir: PathBuf,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file, resolving every relative
    /// path in it against the file's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading runtime config {}", path.display()))?;
        let document: RuntimeConfigSerde =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let resolve = |candidate: &str| -> PathBuf {
            let candidate = Path::new(candidate);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                source_dir.join(candidate)
            }
        };

        let goal_dirs = document.goals.dirs.iter().map(|d| resolve(d)).collect();
        let telemetry_log_dir = document.telemetry.log_dir.as_deref().map(resolve);

        let mut file_watchers = document.file_watchers;
        for watcher in &mut file_watchers {
            watcher.path = resolve(&watcher.path).to_string_lossy().into_owned();
        }
        let mut log_monitors = document.log_monitors;
        for monitor in &mut log_monitors {
            monitor.path = resolve(&monitor.path).to_string_lossy().into_owned();
        }

        Ok(Self {
            goal_dirs,
            bus: BusConfig {
                max_queue_size: document.bus.max_queue_size,
                dedup_window_seconds: document.bus.dedup_window_seconds,
                max_retries: document.bus.max_retries,
                retry_delay: std::time::Duration::from_millis(document.bus.retry_delay_ms),
                dlq_max_size: document.bus.dlq_max_size,
            },
            telemetry_log_dir,
            http_endpoints: document.http_endpoints,
            file_watchers,
            log_monitors,
            audit_log_capacity: document.audit_log_capacity,
            source_dir,
        })
    }

    /// Resolves a path relative to the configuration file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.source_dir.join(candidate)
        }
    }

    /// Convenience path for a given component's telemetry log file,
    /// under [`RuntimeConfig::telemetry_log_dir`].
    #[must_use]
    pub fn telemetry_log_path(&self, module: &str) -> Option<PathBuf> {
        self.telemetry_log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{module}.log")))
    }
}

#[derive(Debug, Deserialize)]
struct RuntimeConfigSerde {
    #[serde(default)]
    goals: GoalsSection,
    #[serde(default)]
    bus: BusSection,
    #[serde(default)]
    telemetry: TelemetrySection,
    #[serde(default)]
    http_endpoints: Vec<HttpEndpoint>,
    #[serde(default)]
    file_watchers: Vec<WatchConfig>,
    #[serde(default)]
    log_monitors: Vec<LogMonitorSpec>,
    #[serde(default = "default_audit_log_capacity")]
    audit_log_capacity: usize,
}

const fn default_audit_log_capacity() -> usize {
    10_000
}

#[derive(Debug, Default, Deserialize)]
struct GoalsSection {
    #[serde(default)]
    dirs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BusSection {
    #[serde(default = "default_max_queue_size")]
    max_queue_size: usize,
    #[serde(default = "default_dedup_window_seconds")]
    dedup_window_seconds: i64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    retry_delay_ms: u64,
    #[serde(default = "default_dlq_max_size")]
    dlq_max_size: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            dedup_window_seconds: default_dedup_window_seconds(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            dlq_max_size: default_dlq_max_size(),
        }
    }
}

const fn default_max_queue_size() -> usize {
    10_000
}
const fn default_dedup_window_seconds() -> i64 {
    60
}
const fn default_max_retries() -> u32 {
    3
}
const fn default_retry_delay_ms() -> u64 {
    1_000
}
const fn default_dlq_max_size() -> usize {
    1_000
}

#[derive(Debug, Default, Deserialize)]
struct TelemetrySection {
    #[serde(default)]
    log_dir: Option<String>,
}

/// TOML-friendly declaration of a log monitor, converted into a
/// [`sentinel_sources::LogMonitorConfig`] at startup. A plain struct
/// rather than that type directly, since `LogMonitorConfig` carries no
/// `Deserialize` impl of its own.
#[derive(Debug, Clone, Deserialize)]
pub struct LogMonitorSpec {
    /// Unique identifier.
    pub id: String,
    /// Log file path.
    pub path: String,
    /// Patterns to search each new line for.
    pub patterns: Vec<String>,
    /// Sliding window, in seconds, over which matches accumulate.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    /// Matches within the window required to emit an event.
    #[serde(default = "default_threshold_count")]
    pub threshold_count: usize,
    /// Priority of emitted events.
    #[serde(default = "default_log_priority")]
    pub priority: EventPriority,
}

const fn default_window_seconds() -> i64 {
    60
}
const fn default_threshold_count() -> usize {
    1
}
const fn default_log_priority() -> EventPriority {
    EventPriority::High
}

impl From<LogMonitorSpec> for sentinel_sources::LogMonitorConfig {
    fn from(spec: LogMonitorSpec) -> Self {
        Self {
            id: spec.id,
            path: spec.path,
            patterns: spec.patterns,
            window_seconds: spec.window_seconds,
            threshold_count: spec.threshold_count,
            priority: spec.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("runtime.toml");
        fs::write(dir.path().join("app.log"), "").unwrap();
        fs::write(
            &config_path,
            r#"
[goals]
dirs = ["goals"]

[bus]
max_queue_size = 500

[telemetry]
log_dir = "logs"

[[http_endpoints]]
id = "site"
url = "https://example.com/health"

[[file_watchers]]
id = "w1"
path = "watched"

[[log_monitors]]
id = "app"
path = "app.log"
patterns = ["ERROR"]
"#,
        )
        .unwrap();

        let config = RuntimeConfig::load(&config_path).unwrap();
        assert_eq!(config.goal_dirs, vec![dir.path().join("goals")]);
        assert_eq!(config.bus.max_queue_size, 500);
        assert_eq!(
            config.telemetry_log_path("core"),
            Some(dir.path().join("logs").join("core.log"))
        );
        assert_eq!(config.http_endpoints.len(), 1);
        assert_eq!(config.file_watchers[0].path, dir.path().join("watched").to_string_lossy());
        assert_eq!(config.log_monitors[0].path, dir.path().join("app.log").to_string_lossy());
    }

    #[test]
    fn defaults_apply_when_sections_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("runtime.toml");
        fs::write(&config_path, "").unwrap();

        let config = RuntimeConfig::load(&config_path).unwrap();
        assert!(config.goal_dirs.is_empty());
        assert_eq!(config.bus.max_queue_size, 10_000);
        assert!(config.telemetry_log_dir.is_none());
        assert_eq!(config.audit_log_capacity, 10_000);
    }
}
