use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{action::Action, risk::RiskLevel, trigger::Trigger};

/// Caps on how often a goal's action may run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum executions within a rolling hour.
    #[serde(default = "default_max_per_hour")]
    pub max_executions_per_hour: u32,
    /// Maximum executions within a rolling day.
    #[serde(default = "default_max_per_day")]
    pub max_executions_per_day: u32,
}

const fn default_max_per_hour() -> u32 {
    10
}
const fn default_max_per_day() -> u32 {
    100
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_executions_per_hour: default_max_per_hour(),
            max_executions_per_day: default_max_per_day(),
        }
    }
}

/// Runtime cooldown and rate-limit bookkeeping, separate from a
/// goal's static configuration so it can be mutated behind a lock
/// while the configuration stays plain data.
#[derive(Debug, Default)]
struct GoalState {
    last_triggered: Option<DateTime<Utc>>,
    executions_this_hour: u32,
    executions_today: u32,
    hour_reset: Option<DateTime<Utc>>,
    day_reset: Option<DateTime<Utc>>,
}

/// A configured autonomous goal: a trigger, an action to take when it
/// fires, and the risk policy and rate limits governing how freely it
/// may run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Goal {
    /// Stable identifier, also used as the YAML merge key.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Condition that makes this goal eligible to run.
    pub trigger: Trigger,
    /// What to do when the trigger fires.
    pub action: Action,
    /// Risk tier, used to set the decision confidence floor.
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Minimum learned confidence required to act without asking.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// If set, the decision engine always asks regardless of confidence.
    #[serde(default)]
    pub requires_approval: bool,
    /// Execution rate limits.
    #[serde(default)]
    pub limits: Limits,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning team or person.
    #[serde(default)]
    pub owner: String,
    /// Whether this goal is currently considered for matching.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(skip, default)]
    state: Mutex<GoalState>,
}

const fn default_confidence_threshold() -> f64 {
    0.75
}
const fn default_enabled() -> bool {
    true
}

impl Goal {
    /// Effective confidence floor: the stricter of the risk tier's
    /// built-in threshold and this goal's own configured threshold.
    #[must_use]
    pub fn effective_threshold(&self) -> f64 {
        self.risk_level.threshold().max(self.confidence_threshold)
    }

    /// Whether this goal may run right now, given its cooldown and
    /// rate limits. Does not itself record an execution.
    #[must_use]
    pub fn can_execute(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();

        if let Some(last) = state.last_triggered {
            if now - last < Duration::seconds(self.trigger.cooldown_seconds) {
                return false;
            }
        }

        if let Some(hour_reset) = state.hour_reset {
            if now >= hour_reset {
                state.executions_this_hour = 0;
                state.hour_reset = None;
            }
        }
        if let Some(day_reset) = state.day_reset {
            if now >= day_reset {
                state.executions_today = 0;
                state.day_reset = None;
            }
        }

        state.executions_this_hour < self.limits.max_executions_per_hour
            && state.executions_today < self.limits.max_executions_per_day
    }

    /// Records that this goal's action ran at `now`, consuming one
    /// unit of its hourly and daily budgets.
    pub fn record_execution(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.last_triggered = Some(now);
        state.executions_this_hour += 1;
        state.executions_today += 1;

        if state.hour_reset.is_none() {
            state.hour_reset = Some(now + Duration::hours(1));
        }
        if state.day_reset.is_none() {
            let start_of_day = now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is a valid time")
                .and_utc();
            state.day_reset = Some(start_of_day + Duration::days(1));
        }
    }

    /// Current executions counted against the hourly budget.
    #[must_use]
    pub fn executions_this_hour(&self) -> u32 {
        self.state.lock().executions_this_hour
    }

    /// Current executions counted against the daily budget.
    #[must_use]
    pub fn executions_today(&self) -> u32 {
        self.state.lock().executions_today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use indexmap::IndexMap;

    fn goal(cooldown: i64, max_hour: u32, max_day: u32) -> Goal {
        Goal {
            id: "g1".into(),
            name: "test goal".into(),
            description: String::new(),
            trigger: Trigger {
                event_type: "http_check".into(),
                filter: IndexMap::new(),
                cooldown_seconds: cooldown,
            },
            action: Action {
                action_type: ActionType::Notify,
                command: None,
                agent_prompt: None,
                url: None,
                method: String::new(),
                body: None,
                channel: Some("ops".into()),
                message: Some("alert".into()),
                timeout_seconds: 60,
                retry_count: 1,
                retry_delay_seconds: 5,
            },
            risk_level: RiskLevel::Medium,
            confidence_threshold: 0.75,
            requires_approval: false,
            limits: Limits {
                max_executions_per_hour: max_hour,
                max_executions_per_day: max_day,
            },
            tags: vec![],
            owner: String::new(),
            enabled: true,
            state: Mutex::default(),
        }
    }

    #[test]
    fn cooldown_blocks_immediate_reexecution() {
        let g = goal(60, 10, 100);
        let now = Utc::now();
        assert!(g.can_execute(now));
        g.record_execution(now);
        assert!(!g.can_execute(now + Duration::seconds(10)));
        assert!(g.can_execute(now + Duration::seconds(61)));
    }

    #[test]
    fn hourly_limit_blocks_once_exhausted() {
        let g = goal(0, 2, 100);
        let now = Utc::now();
        assert!(g.can_execute(now));
        g.record_execution(now);
        assert!(g.can_execute(now));
        g.record_execution(now);
        assert!(!g.can_execute(now));
        assert_eq!(g.executions_this_hour(), 2);
    }

    #[test]
    fn hourly_budget_resets_after_an_hour() {
        let g = goal(0, 1, 100);
        let now = Utc::now();
        g.record_execution(now);
        assert!(!g.can_execute(now + Duration::minutes(30)));
        assert!(g.can_execute(now + Duration::hours(1) + Duration::seconds(1)));
    }
}
