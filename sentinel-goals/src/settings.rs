use serde::{Deserialize, Serialize};

/// Caps applied across every goal, independent of any single goal's
/// own [`crate::goal::Limits`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlobalLimits {
    /// Maximum actions allowed to be in flight at once.
    pub max_concurrent_actions: u32,
    /// Maximum actions started within a rolling minute.
    pub max_actions_per_minute: u32,
}

impl Default for GlobalLimits {
    fn default() -> Self {
        Self {
            max_concurrent_actions: 3,
            max_actions_per_minute: 10,
        }
    }
}

/// Runtime-wide policy, loaded from the `settings` block of any goal
/// file and merged across every file in load order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// When set, no goal is matched regardless of its trigger.
    pub emergency_stop: bool,
    /// Confidence floor used by goals that don't set their own.
    pub default_confidence_threshold: f64,
    /// Caps applied across every goal.
    pub global_limits: GlobalLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            emergency_stop: false,
            default_confidence_threshold: 0.75,
            global_limits: GlobalLimits::default(),
        }
    }
}

/// Sparse view of [`Settings`] as it appears in a goal file — only
/// the fields present in the file are applied, matching the way each
/// loaded file updates the running settings rather than replacing them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub(crate) emergency_stop: Option<bool>,
    pub(crate) default_confidence_threshold: Option<f64>,
    pub(crate) global_limits: Option<GlobalLimitsPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalLimitsPatch {
    pub(crate) max_concurrent_actions: Option<u32>,
    pub(crate) max_actions_per_minute: Option<u32>,
}

impl Settings {
    /// Applies a sparse patch, overwriting only the fields it sets.
    pub fn apply_patch(&mut self, patch: SettingsPatch) {
        if let Some(v) = patch.emergency_stop {
            self.emergency_stop = v;
        }
        if let Some(v) = patch.default_confidence_threshold {
            self.default_confidence_threshold = v;
        }
        if let Some(gl) = patch.global_limits {
            if let Some(v) = gl.max_concurrent_actions {
                self.global_limits.max_concurrent_actions = v;
            }
            if let Some(v) = gl.max_actions_per_minute {
                self.global_limits.max_actions_per_minute = v;
            }
        }
    }
}
