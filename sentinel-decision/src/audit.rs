use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::decision::{Decision, DecisionType};

/// Decision counts broken down by [`DecisionType`], plus the rates
/// most often asked about.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionStats {
    /// Total decisions recorded.
    pub total: usize,
    /// Count per decision type, keyed by its lowercase name.
    pub by_type: HashMap<String, usize>,
    /// `act` count divided by `total`.
    pub act_rate: f64,
    /// `ask` count divided by `total`.
    pub ask_rate: f64,
    /// `reject` count divided by `total`.
    pub reject_rate: f64,
}

/// A bounded, append-only record of every decision the engine has
/// made, for compliance review and debugging. Holds at most
/// `max_entries`, dropping the oldest once full.
pub struct DecisionAuditLog {
    max_entries: usize,
    log: RwLock<Vec<Decision>>,
}

impl DecisionAuditLog {
    /// Creates a log retaining at most `max_entries` decisions.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            log: RwLock::new(Vec::new()),
        }
    }

    /// Appends a decision, trimming the oldest entry if over capacity.
    pub fn record(&self, decision: Decision) {
        let mut log = self.log.write();
        log.push(decision);
        if log.len() > self.max_entries {
            let overflow = log.len() - self.max_entries;
            log.drain(0..overflow);
        }
    }

    /// The most recent `limit` decisions, oldest first.
    #[must_use]
    pub fn get_recent(&self, limit: usize) -> Vec<Decision> {
        let log = self.log.read();
        let start = log.len().saturating_sub(limit);
        log[start..].to_vec()
    }

    /// The most recent `limit` decisions for a specific goal, oldest first.
    #[must_use]
    pub fn get_by_goal(&self, goal_id: &str, limit: usize) -> Vec<Decision> {
        let log = self.log.read();
        let matching: Vec<Decision> = log
            .iter()
            .filter(|decision| decision.goal.goal_id == goal_id)
            .cloned()
            .collect();
        let start = matching.len().saturating_sub(limit);
        matching[start..].to_vec()
    }

    /// The most recent `limit` decisions of a specific type, oldest first.
    #[must_use]
    pub fn get_by_type(&self, decision_type: DecisionType, limit: usize) -> Vec<Decision> {
        let log = self.log.read();
        let matching: Vec<Decision> = log
            .iter()
            .filter(|decision| decision.decision_type == decision_type)
            .cloned()
            .collect();
        let start = matching.len().saturating_sub(limit);
        matching[start..].to_vec()
    }

    /// Aggregate statistics over every recorded decision.
    #[must_use]
    pub fn get_stats(&self) -> DecisionStats {
        let log = self.log.read();
        let total = log.len();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        for decision in log.iter() {
            *by_type.entry(decision.decision_type.as_str().to_string()).or_insert(0) += 1;
        }

        let rate_of = |key: &str| {
            if total == 0 {
                0.0
            } else {
                by_type.get(key).copied().unwrap_or(0) as f64 / total as f64
            }
        };

        DecisionStats {
            total,
            act_rate: rate_of("act"),
            ask_rate: rate_of("ask"),
            reject_rate: rate_of("reject"),
            by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_bus::{Event, Payload};
    use sentinel_goals::{Action, ActionType, GoalMatch, RiskLevel};
    use sentinel_learning::ConfidenceScore;

    fn decision(decision_type: DecisionType, goal_id: &str) -> Decision {
        Decision {
            decision_type,
            goal: GoalMatch {
                goal_id: goal_id.to_string(),
                name: "test".to_string(),
                action: Action {
                    action_type: ActionType::Notify,
                    command: None,
                    agent_prompt: None,
                    url: None,
                    method: String::new(),
                    body: None,
                    channel: None,
                    message: None,
                    timeout_seconds: 60,
                    retry_count: 1,
                    retry_delay_seconds: 5,
                },
                risk_level: RiskLevel::Medium,
                confidence_threshold: 0.75,
                requires_approval: false,
            },
            event: Event::new("http_check", "test", Payload::new()),
            confidence: ConfidenceScore::insufficient(0, Vec::new()),
            reason: "test".to_string(),
            timestamp: chrono::Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn trims_oldest_entries_past_capacity() {
        let log = DecisionAuditLog::new(2);
        log.record(decision(DecisionType::Act, "g1"));
        log.record(decision(DecisionType::Ask, "g2"));
        log.record(decision(DecisionType::Reject, "g3"));

        let recent = log.get_recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].goal.goal_id, "g2");
        assert_eq!(recent[1].goal.goal_id, "g3");
    }

    #[test]
    fn stats_compute_rates_over_total() {
        let log = DecisionAuditLog::new(100);
        log.record(decision(DecisionType::Act, "g1"));
        log.record(decision(DecisionType::Act, "g1"));
        log.record(decision(DecisionType::Ask, "g1"));
        log.record(decision(DecisionType::Reject, "g1"));

        let stats = log.get_stats();
        assert_eq!(stats.total, 4);
        assert!((stats.act_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.ask_rate - 0.25).abs() < f64::EPSILON);
        assert!((stats.reject_rate - 0.25).abs() < f64::EPSILON);
    }
}
