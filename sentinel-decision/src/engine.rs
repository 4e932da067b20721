use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use sentinel_bus::Event;
use sentinel_goals::{GoalMatch, RiskLevel};
use sentinel_learning::{ConfidenceScore, LearningEngine};
use serde_json::{json, Map, Value};

use crate::decision::{Decision, DecisionConfig, DecisionType};

/// Evaluates matched goals against their triggering events and
/// decides whether to act autonomously, ask a human, escalate, or
/// reject — weighing the goal's risk tier against the learning
/// engine's confidence in the action type, plus a recent-failure
/// escalation path.
pub struct DecisionEngine {
    learning: std::sync::Arc<LearningEngine>,
    config: DecisionConfig,
    failure_counts: Mutex<HashMap<String, u32>>,
}

impl DecisionEngine {
    /// Creates an engine with default tuning.
    #[must_use]
    pub fn new(learning: std::sync::Arc<LearningEngine>) -> Self {
        Self::with_config(learning, DecisionConfig::default())
    }

    /// Creates an engine with explicit tuning.
    #[must_use]
    pub fn with_config(learning: std::sync::Arc<LearningEngine>, config: DecisionConfig) -> Self {
        Self {
            learning,
            config,
            failure_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Decides what to do about `goal` having matched `event`.
    pub async fn evaluate(&self, goal: &GoalMatch, event: &Event) -> Decision {
        let context = build_context(goal, event);
        let confidence = self
            .learning
            .get_confidence(goal.action.action_type.as_str(), &context)
            .await;

        if goal.requires_approval {
            return self.decide_ask(
                goal,
                event,
                confidence,
                "Goal is configured to always require approval".to_string(),
            );
        }

        if confidence.sample_count < self.config.min_samples_required {
            return self.decide_ask(
                goal,
                event,
                confidence,
                format!(
                    "Insufficient history ({} samples, need {})",
                    confidence.sample_count, self.config.min_samples_required
                ),
            );
        }

        if confidence.score < self.config.reject_below_confidence {
            return self.decide_reject(
                goal,
                event,
                confidence,
                format!("Confidence too low ({:.0}%)", confidence.score * 100.0),
            );
        }

        let threshold = self.threshold_for(goal.risk_level);
        let effective_threshold = threshold.max(goal.confidence_threshold);

        let failure_count = self
            .failure_counts
            .lock()
            .get(&goal.goal_id)
            .copied()
            .unwrap_or(0);
        if failure_count >= self.config.escalate_after_failures {
            return self.decide_escalate(
                goal,
                event,
                confidence,
                format!("Too many recent failures ({failure_count})"),
            );
        }

        if confidence.score >= effective_threshold {
            self.decide_act(
                goal,
                event,
                confidence,
                format!(
                    "Confidence ({:.0}%) meets threshold ({:.0}%)",
                    confidence.score * 100.0,
                    effective_threshold * 100.0
                ),
            )
        } else {
            self.decide_ask(
                goal,
                event,
                confidence,
                format!(
                    "Confidence ({:.0}%) below threshold ({:.0}%)",
                    confidence.score * 100.0,
                    effective_threshold * 100.0
                ),
            )
        }
    }

    fn threshold_for(&self, risk_level: RiskLevel) -> f64 {
        match risk_level {
            RiskLevel::Low => self.config.low_risk_threshold,
            RiskLevel::Medium => self.config.medium_risk_threshold,
            RiskLevel::High => self.config.high_risk_threshold,
            RiskLevel::Critical => self.config.critical_risk_threshold,
        }
    }

    fn decide_act(
        &self,
        goal: &GoalMatch,
        event: &Event,
        confidence: ConfidenceScore,
        reason: String,
    ) -> Decision {
        let metadata = json_object(json!({
            "risk_level": goal.risk_level.as_str(),
            "threshold": self.threshold_for(goal.risk_level),
            "success_rate": confidence.success_rate,
        }));
        self.decision(DecisionType::Act, goal, event, confidence, reason, metadata)
    }

    fn decide_ask(
        &self,
        goal: &GoalMatch,
        event: &Event,
        confidence: ConfidenceScore,
        reason: String,
    ) -> Decision {
        let recommendation = if confidence.score > 0.5 { "approve" } else { "review" };
        let metadata = json_object(json!({
            "risk_level": goal.risk_level.as_str(),
            "threshold": self.threshold_for(goal.risk_level),
            "recommendation": recommendation,
        }));
        self.decision(DecisionType::Ask, goal, event, confidence, reason, metadata)
    }

    fn decide_escalate(
        &self,
        goal: &GoalMatch,
        event: &Event,
        confidence: ConfidenceScore,
        reason: String,
    ) -> Decision {
        let failure_count = self
            .failure_counts
            .lock()
            .get(&goal.goal_id)
            .copied()
            .unwrap_or(0);
        let metadata = json_object(json!({
            "failure_count": failure_count,
            "requires_senior_approval": true,
        }));
        self.decision(DecisionType::Escalate, goal, event, confidence, reason, metadata)
    }

    fn decide_reject(
        &self,
        goal: &GoalMatch,
        event: &Event,
        confidence: ConfidenceScore,
        reason: String,
    ) -> Decision {
        self.decision(DecisionType::Reject, goal, event, confidence, reason, Map::new())
    }

    fn decision(
        &self,
        decision_type: DecisionType,
        goal: &GoalMatch,
        event: &Event,
        confidence: ConfidenceScore,
        reason: String,
        metadata: Map<String, Value>,
    ) -> Decision {
        Decision {
            decision_type,
            goal: goal.clone(),
            event: event.clone(),
            confidence,
            reason,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Records whether a goal's action succeeded, for escalation
    /// tracking: a success resets the streak, a failure extends it.
    pub fn record_outcome(&self, goal_id: &str, success: bool) {
        let mut counts = self.failure_counts.lock();
        if success {
            counts.insert(goal_id.to_string(), 0);
        } else {
            *counts.entry(goal_id.to_string()).or_insert(0) += 1;
        }
    }

    /// Resets a goal's failure streak directly.
    pub fn reset_failures(&self, goal_id: &str) {
        self.failure_counts.lock().insert(goal_id.to_string(), 0);
    }

    /// A human-readable explanation of a past decision.
    #[must_use]
    pub fn get_explanation(&self, decision: &Decision) -> String {
        let mut lines = vec![
            format!("**Decision: {}**", decision.decision_type.as_str().to_uppercase()),
            String::new(),
            format!("**Goal:** {}", decision.goal.name),
            format!(
                "**Event:** {} from {}",
                decision.event.event_type, decision.event.source
            ),
            format!("**Risk Level:** {}", decision.goal.risk_level.as_str()),
            String::new(),
            "**Confidence Analysis:**".to_string(),
            format!("  - Score: {:.0}%", decision.confidence.score * 100.0),
            format!("  - Samples: {}", decision.confidence.sample_count),
            format!("  - Success Rate: {:.0}%", decision.confidence.success_rate * 100.0),
            String::new(),
            format!("**Reason:** {}", decision.reason),
        ];

        if decision.needs_approval() {
            let recommendation = decision
                .metadata
                .get("recommendation")
                .and_then(Value::as_str)
                .unwrap_or("review");
            lines.push(String::new());
            lines.push(format!("**Recommendation:** {}", capitalize(recommendation)));
        }

        lines.join("\n")
    }
}

fn build_context(goal: &GoalMatch, event: &Event) -> String {
    let mut parts = vec![
        format!("Goal: {}", goal.name),
        format!("Event: {} from {}", event.event_type, event.source),
    ];
    for (key, value) in &event.payload {
        if let Some(scalar) = value.as_scalar_string() {
            parts.push(format!("{key}: {scalar}"));
        }
    }
    parts.join(" | ")
}

fn json_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}
