use std::sync::Arc;

use async_trait::async_trait;
use sentinel_bus::{Event, EventBus, EventHandler};
use sentinel_decision::{Decision, DecisionAuditLog, DecisionEngine};
use sentinel_goals::GoalManager;
use sentinel_learning::LearningEngine;
use sentinel_logging::LogLevel;
use sentinel_telemetry::SentinelTelemetry;
use serde_json::json;

use crate::executor::ActionExecutor;

/// Wires the goal manager, decision engine, learning engine, and a
/// host-supplied [`ActionExecutor`] into a single [`EventHandler`]:
/// every event the bus delivers here is matched against goals,
/// evaluated, and — for `Act` decisions — executed, with the outcome
/// fed back into learning and decision state.
pub struct Orchestrator {
    goals: Arc<GoalManager>,
    decision: Arc<DecisionEngine>,
    learning: Arc<LearningEngine>,
    audit: Arc<DecisionAuditLog>,
    executor: Arc<dyn ActionExecutor>,
    telemetry: Option<SentinelTelemetry>,
}

impl Orchestrator {
    /// Assembles an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        goals: Arc<GoalManager>,
        decision: Arc<DecisionEngine>,
        learning: Arc<LearningEngine>,
        audit: Arc<DecisionAuditLog>,
        executor: Arc<dyn ActionExecutor>,
        telemetry: Option<SentinelTelemetry>,
    ) -> Self {
        Self {
            goals,
            decision,
            learning,
            audit,
            executor,
            telemetry,
        }
    }

    /// Registers this orchestrator as a catch-all subscriber on `bus`
    /// (empty `event_types` means every event is delivered here).
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        bus.subscribe(Arc::clone(self) as Arc<dyn EventHandler>, [], None, None);
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    async fn handle_match(&self, decision: Decision) {
        self.audit.record(decision.clone());

        if !decision.should_execute() {
            self.log(
                LogLevel::Info,
                "orchestrator.decision_recorded",
                json!({
                    "goal_id": decision.goal.goal_id,
                    "decision_type": decision.decision_type.as_str(),
                }),
            );
            return;
        }

        if !self.goals.can_execute(&decision.goal.goal_id) {
            self.log(
                LogLevel::Info,
                "orchestrator.execution_blocked",
                json!({ "goal_id": decision.goal.goal_id, "reason": "cooldown_or_rate_limit" }),
            );
            return;
        }

        let outcome = self.executor.execute(&decision.goal, &decision.event).await;

        self.goals.record_execution(&decision.goal.goal_id);
        self.decision.record_outcome(&decision.goal.goal_id, outcome.success);

        let context = format!(
            "Goal: {} | Event: {} from {}",
            decision.goal.name, decision.event.event_type, decision.event.source
        );
        self.learning
            .record_action(
                decision.goal.action.action_type.as_str(),
                decision.goal.goal_id.clone(),
                context,
                outcome.success,
                outcome.duration_ms,
                outcome.error_message.clone(),
                serde_json::Map::new(),
            )
            .await;

        self.log(
            LogLevel::Info,
            "orchestrator.action_executed",
            json!({
                "goal_id": decision.goal.goal_id,
                "success": outcome.success,
                "duration_ms": outcome.duration_ms,
            }),
        );
    }
}

#[async_trait]
impl EventHandler for Orchestrator {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let matches = self.goals.find_matching_goals(event);
        for goal_match in matches {
            let decision = self.decision.evaluate(&goal_match, event).await;
            self.handle_match(decision).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_bus::{BusConfig, Payload};
    use sentinel_memory::{InMemorySemanticMemory, SemanticMemory};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActionExecutor for CountingExecutor {
        async fn execute(&self, _goal: &sentinel_goals::GoalMatch, _event: &Event) -> crate::executor::ExecutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            crate::executor::ExecutionOutcome {
                success: true,
                duration_ms: 1,
                error_message: None,
            }
        }
    }

    fn write_goal_file(dir: &std::path::Path, contents: &str) {
        std::fs::write(dir.join("g.yaml"), contents).unwrap();
    }

    #[tokio::test]
    async fn acting_decision_executes_and_records_outcome() {
        let dir = tempfile::tempdir().unwrap();
        write_goal_file(
            dir.path(),
            r#"
goals:
  - id: restart
    name: Restart
    trigger:
      event_type: http_check
      cooldown_seconds: 0
    action:
      type: shell
      command: "true"
    risk_level: low
"#,
        );

        let goals = Arc::new(GoalManager::new());
        goals.load_dir(dir.path()).unwrap();

        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..6 {
            memory
                .store_action(&sentinel_memory::ActionRecord {
                    action_id: uuid::Uuid::new_v4(),
                    action_type: "shell".to_string(),
                    goal_id: "restart".to_string(),
                    context: "Goal: Restart | Event: http_check from test".to_string(),
                    success: true,
                    duration_ms: 10,
                    timestamp: chrono::Utc::now(),
                    error_message: None,
                    metadata: serde_json::Map::new(),
                })
                .await
                .unwrap();
        }
        let learning = Arc::new(LearningEngine::new(memory));
        let decision = Arc::new(DecisionEngine::new(Arc::clone(&learning)));
        let audit = Arc::new(DecisionAuditLog::new(100));
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&goals),
            decision,
            learning,
            Arc::clone(&audit),
            executor.clone(),
            None,
        ));

        let bus = EventBus::new(BusConfig::default());
        orchestrator.attach(&bus);
        bus.start();
        bus.publish(Event::new("http_check", "test", Payload::new()));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        bus.stop().await;

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(audit.get_stats().total, 1);
    }
}
