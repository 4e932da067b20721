use chrono::{DateTime, Utc};
use sentinel_bus::Event;
use sentinel_goals::GoalMatch;
use sentinel_learning::ConfidenceScore;
use serde::{Deserialize, Serialize};

/// What the decision engine recommends doing about a matched goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    /// Execute the action autonomously.
    Act,
    /// Ask a human before executing.
    Ask,
    /// Defer the decision. Reachable via [`super::engine::DecisionEngine`]'s
    /// internals but never returned by `evaluate` — kept for parity
    /// with callers that match on the full enum.
    Defer,
    /// Escalate to a higher authority.
    Escalate,
    /// Refuse to execute.
    Reject,
}

impl DecisionType {
    /// Lowercase name, matching the original system's enum values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Act => "act",
            Self::Ask => "ask",
            Self::Defer => "defer",
            Self::Escalate => "escalate",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for [`super::engine::DecisionEngine::evaluate`].
#[derive(Debug, Clone, Copy)]
pub struct DecisionConfig {
    /// Confidence floor for low-risk goals.
    pub low_risk_threshold: f64,
    /// Confidence floor for medium-risk goals.
    pub medium_risk_threshold: f64,
    /// Confidence floor for high-risk goals.
    pub high_risk_threshold: f64,
    /// Confidence floor for critical-risk goals — `1.0` always asks.
    pub critical_risk_threshold: f64,
    /// Minimum similar-action samples before a score is trusted.
    pub min_samples_required: usize,
    /// Confidence below which the action is rejected outright.
    pub reject_below_confidence: f64,
    /// Consecutive failures after which a goal escalates instead of acting.
    pub escalate_after_failures: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            low_risk_threshold: 0.5,
            medium_risk_threshold: 0.75,
            high_risk_threshold: 0.9,
            critical_risk_threshold: 1.0,
            min_samples_required: 3,
            reject_below_confidence: 0.1,
            escalate_after_failures: 3,
        }
    }
}

/// The outcome of evaluating one matched goal against its triggering event.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// What to do.
    pub decision_type: DecisionType,
    /// The goal this decision is about.
    pub goal: GoalMatch,
    /// The event that triggered the goal.
    pub event: Event,
    /// The confidence score the decision was based on.
    pub confidence: ConfidenceScore,
    /// Human-readable justification.
    pub reason: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Extra detail specific to the decision type.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Decision {
    /// Whether this decision means the action should run now.
    #[must_use]
    pub fn should_execute(&self) -> bool {
        self.decision_type == DecisionType::Act
    }

    /// Whether this decision means a human needs to approve first.
    #[must_use]
    pub fn needs_approval(&self) -> bool {
        self.decision_type == DecisionType::Ask
    }
}
