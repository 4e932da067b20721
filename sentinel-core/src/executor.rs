use std::time::Instant;

use async_trait::async_trait;
use sentinel_bus::Event;
use sentinel_goals::{ActionType, GoalMatch};
use serde::Serialize;
use tokio::process::Command;

/// Result of running a goal's action.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// Whether the action completed successfully.
    pub success: bool,
    /// Wall-clock time the action took.
    pub duration_ms: u64,
    /// Error details, if it failed.
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    fn ok(duration_ms: u64) -> Self {
        Self {
            success: true,
            duration_ms,
            error_message: None,
        }
    }

    fn failed(duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms,
            error_message: Some(message.into()),
        }
    }
}

/// Host-supplied collaborator that actually carries out a goal's
/// action. The orchestrator calls this only for `Act` decisions; its
/// result feeds back into the learning and decision layers.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Executes `goal`'s action, triggered by `event`.
    async fn execute(&self, goal: &GoalMatch, event: &Event) -> ExecutionOutcome;
}

/// Executor that does nothing and always reports success. Useful for
/// demos and for goals whose action is purely informational
/// (`Notify`) when no notification backend is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

#[async_trait]
impl ActionExecutor for NoopExecutor {
    async fn execute(&self, _goal: &GoalMatch, _event: &Event) -> ExecutionOutcome {
        ExecutionOutcome::ok(0)
    }
}

/// Executor that runs a `Shell`-type action's command through the host
/// shell. Not sandboxed and not suitable for untrusted goal
/// definitions — the same caveat the original system's own shell
/// executor carries. Actions of any other type are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl ActionExecutor for ShellExecutor {
    async fn execute(&self, goal: &GoalMatch, _event: &Event) -> ExecutionOutcome {
        if goal.action.action_type != ActionType::Shell {
            return ExecutionOutcome::failed(
                0,
                format!("ShellExecutor cannot run a {} action", goal.action.action_type),
            );
        }
        let Some(command) = &goal.action.command else {
            return ExecutionOutcome::failed(0, "shell action has no command");
        };

        let start = Instant::now();
        let timeout = std::time::Duration::from_secs(goal.action.timeout_seconds);
        let run = Command::new("sh").arg("-c").arg(command).output();

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                if output.status.success() {
                    ExecutionOutcome::ok(duration_ms)
                } else {
                    ExecutionOutcome::failed(
                        duration_ms,
                        String::from_utf8_lossy(&output.stderr).into_owned(),
                    )
                }
            }
            Ok(Err(err)) => ExecutionOutcome::failed(start.elapsed().as_millis() as u64, err.to_string()),
            Err(_) => ExecutionOutcome::failed(start.elapsed().as_millis() as u64, "command timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_bus::{Event, Payload};
    use sentinel_goals::{Action, RiskLevel};

    fn goal(action_type: ActionType, command: Option<&str>) -> GoalMatch {
        GoalMatch {
            goal_id: "g1".to_string(),
            name: "test".to_string(),
            action: Action {
                action_type,
                command: command.map(str::to_string),
                agent_prompt: None,
                url: None,
                method: String::new(),
                body: None,
                channel: None,
                message: None,
                timeout_seconds: 5,
                retry_count: 1,
                retry_delay_seconds: 1,
            },
            risk_level: RiskLevel::Low,
            confidence_threshold: 0.5,
            requires_approval: false,
        }
    }

    fn event() -> Event {
        Event::new("file_change", "test", Payload::new())
    }

    #[tokio::test]
    async fn noop_executor_always_succeeds() {
        let outcome = NoopExecutor.execute(&goal(ActionType::Notify, None), &event()).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn shell_executor_runs_command() {
        let outcome = ShellExecutor
            .execute(&goal(ActionType::Shell, Some("exit 0")), &event())
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn shell_executor_reports_nonzero_exit() {
        let outcome = ShellExecutor
            .execute(&goal(ActionType::Shell, Some("exit 1")), &event())
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn shell_executor_rejects_non_shell_actions() {
        let outcome = ShellExecutor
            .execute(&goal(ActionType::Notify, None), &event())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error_message.unwrap().contains("notify"));
    }
}
