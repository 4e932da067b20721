use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use sentinel_bus::Event;
use sentinel_logging::LogLevel;
use sentinel_telemetry::SentinelTelemetry;
use serde::{Deserialize, Serialize};

use crate::{
    action::Action,
    error::GoalError,
    goal::Goal,
    risk::RiskLevel,
    settings::{Settings, SettingsPatch},
};

#[derive(Debug, Deserialize)]
struct GoalFile {
    #[serde(default)]
    goals: Vec<serde_yaml::Value>,
    #[serde(default)]
    settings: Option<SettingsPatch>,
}

/// A goal whose trigger matched an event, along with its
/// already-rendered action and the policy the decision layer needs to
/// evaluate it.
#[derive(Debug, Clone, Serialize)]
pub struct GoalMatch {
    /// The matched goal's id.
    pub goal_id: String,
    /// The matched goal's name.
    pub name: String,
    /// The action, with template placeholders resolved against the event.
    pub action: Action,
    /// The goal's risk tier.
    pub risk_level: RiskLevel,
    /// The goal's own confidence threshold.
    pub confidence_threshold: f64,
    /// Whether this goal always requires human approval.
    pub requires_approval: bool,
}

/// Snapshot of the manager's current state, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct GoalManagerStatus {
    /// Total goals loaded.
    pub total_goals: usize,
    /// Goals currently enabled.
    pub enabled_goals: usize,
    /// Whether the emergency stop is engaged.
    pub emergency_stop: bool,
}

/// Owns the set of configured goals and the runtime-wide settings that
/// govern them: loads goal definitions from YAML files, matches
/// events against triggers, and tracks per-goal execution budgets.
pub struct GoalManager {
    goals: RwLock<IndexMap<String, Goal>>,
    settings: RwLock<Settings>,
    telemetry: Option<SentinelTelemetry>,
}

impl Default for GoalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GoalManager {
    /// Creates an empty manager with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_telemetry(None)
    }

    /// Creates an empty manager with an optional telemetry handle used
    /// to report per-goal parse failures.
    #[must_use]
    pub fn with_telemetry(telemetry: Option<SentinelTelemetry>) -> Self {
        Self {
            goals: RwLock::new(IndexMap::new()),
            settings: RwLock::new(Settings::default()),
            telemetry,
        }
    }

    /// Loads every `*.yaml` file in `dir`, merging goals by id and
    /// applying each file's `settings` block over the running
    /// settings. A file whose top-level structure fails to parse is
    /// reported as an error; goals within an otherwise-valid file that
    /// fail to parse individually are skipped and logged instead.
    /// Returns the number of goals loaded across all files.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, GoalError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| GoalError::ConfigDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut total = 0;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            total += self.load_file(&path)?;
        }
        Ok(total)
    }

    /// Loads a single goal file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, GoalError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| GoalError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        let file: GoalFile =
            serde_yaml::from_str(&contents).map_err(|source| GoalError::FileParse {
                path: path.display().to_string(),
                source,
            })?;

        if let Some(patch) = file.settings {
            self.settings.write().apply_patch(patch);
        }

        let mut loaded = 0;
        let mut goals = self.goals.write();
        for value in file.goals {
            match serde_yaml::from_value::<Goal>(value) {
                Ok(goal) => {
                    goals.insert(goal.id.clone(), goal);
                    loaded += 1;
                }
                Err(err) => self.log_skip(path, &err),
            }
        }
        Ok(loaded)
    }

    fn log_skip(&self, path: &Path, err: &serde_yaml::Error) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Warn,
                "goals.parse_skipped",
                serde_json::json!({
                    "file": path.display().to_string(),
                    "error": err.to_string(),
                }),
            );
        }
    }

    /// Returns every enabled goal whose trigger matches `event`, with
    /// its action rendered against the event. Returns no matches while
    /// the emergency stop is engaged.
    #[must_use]
    pub fn find_matching_goals(&self, event: &Event) -> Vec<GoalMatch> {
        if self.settings.read().emergency_stop {
            return Vec::new();
        }
        self.goals
            .read()
            .values()
            .filter(|goal| goal.enabled && goal.trigger.matches(event))
            .map(|goal| GoalMatch {
                goal_id: goal.id.clone(),
                name: goal.name.clone(),
                action: goal.action.render(event),
                risk_level: goal.risk_level,
                confidence_threshold: goal.confidence_threshold,
                requires_approval: goal.requires_approval,
            })
            .collect()
    }

    /// Whether the given goal's cooldown and rate limits currently
    /// allow it to run. Returns `false` for an unknown goal id.
    #[must_use]
    pub fn can_execute(&self, goal_id: &str) -> bool {
        self.goals
            .read()
            .get(goal_id)
            .is_some_and(|goal| goal.can_execute(Utc::now()))
    }

    /// Records that `goal_id` just ran, consuming one unit of its
    /// rate-limit budgets. A no-op for an unknown goal id.
    pub fn record_execution(&self, goal_id: &str) {
        if let Some(goal) = self.goals.read().get(goal_id) {
            goal.record_execution(Utc::now());
        }
    }

    /// Engages or releases the emergency stop.
    pub fn set_emergency_stop(&self, stop: bool) {
        self.settings.write().emergency_stop = stop;
    }

    /// Whether the emergency stop is currently engaged.
    #[must_use]
    pub fn emergency_stop(&self) -> bool {
        self.settings.read().emergency_stop
    }

    /// Enables a goal. Returns `false` if it doesn't exist.
    pub fn enable(&self, goal_id: &str) -> bool {
        self.goals
            .write()
            .get_mut(goal_id)
            .map(|goal| goal.enabled = true)
            .is_some()
    }

    /// Disables a goal. Returns `false` if it doesn't exist.
    pub fn disable(&self, goal_id: &str) -> bool {
        self.goals
            .write()
            .get_mut(goal_id)
            .map(|goal| goal.enabled = false)
            .is_some()
    }

    /// A point-in-time summary of the manager's state.
    #[must_use]
    pub fn get_status(&self) -> GoalManagerStatus {
        let goals = self.goals.read();
        GoalManagerStatus {
            total_goals: goals.len(),
            enabled_goals: goals.values().filter(|g| g.enabled).count(),
            emergency_stop: self.settings.read().emergency_stop,
        }
    }
}
