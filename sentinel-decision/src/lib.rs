#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Turns a matched goal and its confidence history into a decision:
//! act autonomously, ask a human, escalate, or reject — plus a
//! bounded audit trail of every decision made.

mod audit;
mod decision;
mod engine;

pub use audit::{DecisionAuditLog, DecisionStats};
pub use decision::{Decision, DecisionConfig, DecisionType};
pub use engine::DecisionEngine;

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_bus::{Event, Payload};
    use sentinel_goals::{Action, ActionType, GoalMatch, RiskLevel};
    use sentinel_learning::LearningEngine;
    use sentinel_memory::{ActionRecord, InMemorySemanticMemory, SemanticMemory};
    use std::sync::Arc;
    use uuid::Uuid;

    fn goal_match(requires_approval: bool, risk_level: RiskLevel) -> GoalMatch {
        GoalMatch {
            goal_id: "restart_on_down".to_string(),
            name: "Restart on downtime".to_string(),
            action: Action {
                action_type: ActionType::Shell,
                command: Some("systemctl restart web".to_string()),
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
            risk_level,
            confidence_threshold: 0.75,
            requires_approval,
        }
    }

    fn event() -> Event {
        let mut payload = Payload::new();
        payload.insert("status".to_string(), "down".into());
        Event::new("http_check", "http_monitor:site", payload)
    }

    fn history_record(action_type: &str, success: bool) -> ActionRecord {
        ActionRecord {
            action_id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            goal_id: "restart_on_down".to_string(),
            context: "Goal: Restart on downtime | Event: http_check from http_monitor:site | status: down".to_string(),
            success,
            duration_ms: 100,
            timestamp: chrono::Utc::now(),
            error_message: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn requires_approval_always_asks() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        let decision = engine.evaluate(&goal_match(true, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Ask);
    }

    #[tokio::test]
    async fn insufficient_samples_asks() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        let decision = engine.evaluate(&goal_match(false, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Ask);
    }

    #[tokio::test]
    async fn consistent_success_history_acts_for_low_risk() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..6 {
            memory.store_action(&history_record("shell", true)).await.unwrap();
        }
        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        let decision = engine.evaluate(&goal_match(false, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Act);
        assert!(decision.should_execute());
    }

    #[tokio::test]
    async fn mostly_failing_history_rejects() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..6 {
            memory.store_action(&history_record("shell", false)).await.unwrap();
        }
        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        let decision = engine.evaluate(&goal_match(false, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Reject);
    }

    #[tokio::test]
    async fn repeated_failures_escalate_instead_of_acting() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..6 {
            memory.store_action(&history_record("shell", true)).await.unwrap();
        }
        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        engine.record_outcome("restart_on_down", false);
        engine.record_outcome("restart_on_down", false);
        engine.record_outcome("restart_on_down", false);

        let decision = engine.evaluate(&goal_match(false, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Escalate);
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..6 {
            memory.store_action(&history_record("shell", true)).await.unwrap();
        }
        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        engine.record_outcome("restart_on_down", false);
        engine.record_outcome("restart_on_down", false);
        engine.record_outcome("restart_on_down", true);
        engine.record_outcome("restart_on_down", false);
        engine.record_outcome("restart_on_down", false);

        let decision = engine.evaluate(&goal_match(false, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Act);
    }

    #[tokio::test]
    async fn confidence_just_below_threshold_asks_rather_than_acts() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..4 {
            memory.store_action(&history_record("shell", true)).await.unwrap();
        }
        memory.store_action(&history_record("shell", false)).await.unwrap();

        let learning = Arc::new(LearningEngine::new(memory));
        let engine = DecisionEngine::new(learning);

        // 4 successes + 1 failure, all identical context (similarity 1.0):
        // weighted_success = 4.0, total_weight = 4.0 + 1.5 = 5.5, confidence ~= 0.727.
        // Low-risk threshold is 0.5 but the goal's own confidence_threshold
        // (0.75) wins via effective_threshold's max(), so this still asks.
        let decision = engine.evaluate(&goal_match(false, RiskLevel::Low), &event()).await;
        assert_eq!(decision.decision_type, DecisionType::Ask);
        assert!(!decision.should_execute());
    }
}
