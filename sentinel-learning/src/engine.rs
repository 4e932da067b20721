use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sentinel_logging::LogLevel;
use sentinel_memory::{collections, ActionRecord, MemoryError, MemoryResult, SemanticMemory};
use sentinel_telemetry::SentinelTelemetry;
use serde::Serialize;
use uuid::Uuid;

use crate::confidence::{ConfidenceScore, Recommendation};

/// Tunables for [`LearningEngine`], mirroring the defaults the
/// original system shipped with.
#[derive(Debug, Clone, Copy)]
pub struct LearningEngineConfig {
    /// Minimum similar actions required before a confidence score is trusted.
    pub min_samples: usize,
    /// Days after which an action's recency weight starts meaningfully decaying.
    pub confidence_decay_days: i64,
    /// Weight multiplier applied to successful actions.
    pub success_weight: f64,
    /// Weight multiplier applied to failed actions.
    pub failure_weight: f64,
    /// How long a cached confidence score stays valid.
    pub cache_ttl: Duration,
}

impl Default for LearningEngineConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            confidence_decay_days: 30,
            success_weight: 1.0,
            failure_weight: 1.5,
            cache_ttl: Duration::minutes(5),
        }
    }
}

/// Per-action-type, per-goal outcome totals for a reporting window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutcomeTally {
    /// Total actions observed.
    pub total: u64,
    /// Of those, the number that succeeded.
    pub success: u64,
    /// Of those, the number that failed.
    pub failure: u64,
}

/// Aggregate learning activity over a reporting window.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    /// Size of the reporting window, in days.
    pub period_days: i64,
    /// Total actions observed in the window.
    pub total_actions: u64,
    /// Successes in the window.
    pub successes: u64,
    /// Failures in the window.
    pub failures: u64,
    /// `successes / total_actions`, or `0.0` if there were none.
    pub success_rate: f64,
    /// Totals broken down by action type.
    pub by_action_type: HashMap<String, OutcomeTally>,
    /// Totals broken down by goal.
    pub by_goal: HashMap<String, OutcomeTally>,
}

struct CacheEntry {
    score: ConfidenceScore,
    cached_at: DateTime<Utc>,
}

/// Learns from recorded action outcomes: scores how much to trust an
/// action type in a given context, and turns that history into
/// recommendations. Backed by a [`SemanticMemory`] collaborator rather
/// than owning storage itself.
pub struct LearningEngine {
    memory: Arc<dyn SemanticMemory>,
    config: LearningEngineConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
    telemetry: Option<SentinelTelemetry>,
}

impl LearningEngine {
    /// Creates an engine with default tuning.
    #[must_use]
    pub fn new(memory: Arc<dyn SemanticMemory>) -> Self {
        Self::with_config(memory, LearningEngineConfig::default())
    }

    /// Creates an engine with explicit tuning.
    #[must_use]
    pub fn with_config(memory: Arc<dyn SemanticMemory>, config: LearningEngineConfig) -> Self {
        Self {
            memory,
            config,
            cache: Mutex::new(HashMap::new()),
            telemetry: None,
        }
    }

    /// Attaches a telemetry handle used to log memory-backend errors.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SentinelTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    fn log_error(&self, message: &str, error: &MemoryError) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Error,
                message,
                serde_json::json!({ "error": error.to_string() }),
            );
        }
    }

    /// Records an action's outcome for future confidence lookups.
    /// Storage failures are logged rather than propagated — the action
    /// already happened whether or not it could be recorded.
    pub async fn record_action(
        &self,
        action_type: impl Into<String>,
        goal_id: impl Into<String>,
        context: impl Into<String>,
        success: bool,
        duration_ms: u64,
        error_message: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> ActionRecord {
        let action_type = action_type.into();
        let record = ActionRecord {
            action_id: Uuid::new_v4(),
            action_type: action_type.clone(),
            goal_id: goal_id.into(),
            context: context.into(),
            success,
            duration_ms,
            timestamp: Utc::now(),
            error_message,
            metadata,
        };

        match self.memory.store_action(&record).await {
            Ok(()) => self.invalidate_cache(&action_type),
            Err(err) => self.log_error("learning.store_action_failed", &err),
        }

        record
    }

    /// Returns a confidence score for `action_type` in `context`,
    /// backed by a 5-minute cache keyed on the action type and the
    /// first 100 *characters* (not bytes) of the context — matching
    /// the original system exactly so UTF-8 boundaries never panic.
    pub async fn get_confidence(&self, action_type: &str, context: &str) -> ConfidenceScore {
        let cache_key = cache_key(action_type, context);
        if let Some(cached) = self.cached(&cache_key) {
            return cached;
        }

        let query = format!("{action_type} action: {context}");
        let results = match self
            .memory
            .find_memories(&query, 50, collections::LEARNING, 0.3)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                self.log_error("learning.find_memories_failed", &err);
                return ConfidenceScore::insufficient(0, Vec::new());
            }
        };

        if results.len() < self.config.min_samples {
            return ConfidenceScore::insufficient(results.len(), results);
        }

        let score = self.calculate_confidence(&results);
        self.cache.lock().insert(
            cache_key,
            CacheEntry {
                score: score.clone(),
                cached_at: Utc::now(),
            },
        );
        score
    }

    fn calculate_confidence(&self, results: &[MemoryResult]) -> ConfidenceScore {
        let now = Utc::now();
        let mut weighted_success = 0.0_f64;
        let mut total_weight = 0.0_f64;
        let mut total_duration = 0.0_f64;
        let mut successes = 0usize;
        let mut last_success: Option<DateTime<Utc>> = None;
        let mut last_failure: Option<DateTime<Utc>> = None;

        for result in results {
            let success = result
                .metadata
                .get("success")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let duration = result
                .metadata
                .get("duration_ms")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0);
            let timestamp = result
                .metadata
                .get("timestamp")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);

            let days_old = (now - timestamp).num_days();
            #[allow(clippy::cast_precision_loss)]
            let recency_factor =
                (1.0 - (days_old as f64 / self.config.confidence_decay_days as f64)).max(0.1);

            let mut weight = f64::from(result.score) * recency_factor;
            if success {
                weight *= self.config.success_weight;
                weighted_success += weight;
                successes += 1;
                if last_success.map_or(true, |prev| timestamp > prev) {
                    last_success = Some(timestamp);
                }
            } else {
                weight *= self.config.failure_weight;
                if last_failure.map_or(true, |prev| timestamp > prev) {
                    last_failure = Some(timestamp);
                }
            }

            total_weight += weight;
            total_duration += duration;
        }

        let sample_count = results.len();
        #[allow(clippy::cast_precision_loss)]
        let sample_count_f = sample_count as f64;

        ConfidenceScore {
            score: if total_weight > 0.0 {
                weighted_success / total_weight
            } else {
                0.0
            },
            sample_count,
            success_rate: if sample_count > 0 {
                successes as f64 / sample_count_f
            } else {
                0.0
            },
            avg_duration_ms: if sample_count > 0 {
                total_duration / sample_count_f
            } else {
                0.0
            },
            last_success,
            last_failure,
            similar_actions: results.iter().take(5).cloned().collect(),
        }
    }

    /// Suggests up to `limit` action types worth trusting in `context`,
    /// ranked by confidence.
    pub async fn get_recommendations(&self, context: &str, limit: usize) -> Vec<Recommendation> {
        let results = match self
            .memory
            .find_memories(context, limit * 3, collections::LEARNING, 0.5)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                self.log_error("learning.get_recommendations_failed", &err);
                return Vec::new();
            }
        };

        let mut groups: HashMap<String, Vec<MemoryResult>> = HashMap::new();
        for result in results {
            let action_type = result
                .metadata
                .get("action_type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            groups.entry(action_type).or_default().push(result);
        }

        let mut recommendations: Vec<Recommendation> = groups
            .into_iter()
            .filter_map(|(action_type, group)| {
                let confidence = self.calculate_confidence(&group);
                (confidence.score > 0.5 && confidence.has_sufficient_data()).then(|| {
                    Recommendation {
                        reason: generate_reason(&action_type, &confidence),
                        action_type,
                        context: context.to_string(),
                        confidence: confidence.score,
                        supporting_actions: group.into_iter().take(3).collect(),
                    }
                })
            })
            .collect();

        recommendations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        recommendations.truncate(limit);
        recommendations
    }

    /// Summarizes learning activity over the last `days` days.
    pub async fn get_daily_summary(&self, days: i64) -> Result<DailySummary, MemoryError> {
        let results = self
            .memory
            .find_memories("action executed", 100, collections::LEARNING, 0.0)
            .await?;

        let cutoff = Utc::now() - Duration::days(days);
        let recent: Vec<MemoryResult> = results
            .into_iter()
            .filter(|result| {
                result
                    .metadata
                    .get("timestamp")
                    .and_then(serde_json::Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .is_some_and(|ts| ts.with_timezone(&Utc) >= cutoff)
            })
            .collect();

        let mut by_action_type: HashMap<String, OutcomeTally> = HashMap::new();
        let mut by_goal: HashMap<String, OutcomeTally> = HashMap::new();
        let mut successes = 0u64;

        for result in &recent {
            let success = result
                .metadata
                .get("success")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if success {
                successes += 1;
            }

            let action_type = result
                .metadata
                .get("action_type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            tally(by_action_type.entry(action_type.to_string()).or_default(), success);

            let goal_id = result
                .metadata
                .get("goal_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            tally(by_goal.entry(goal_id.to_string()).or_default(), success);
        }

        let total = recent.len() as u64;
        Ok(DailySummary {
            period_days: days,
            total_actions: total,
            successes,
            failures: total - successes,
            success_rate: if total > 0 {
                successes as f64 / total as f64
            } else {
                0.0
            },
            by_action_type,
            by_goal,
        })
    }

    fn cached(&self, key: &str) -> Option<ConfidenceScore> {
        let mut cache = self.cache.lock();
        let Some(entry) = cache.get(key) else {
            return None;
        };
        if Utc::now() - entry.cached_at < self.config.cache_ttl {
            Some(entry.score.clone())
        } else {
            cache.remove(key);
            None
        }
    }

    fn invalidate_cache(&self, action_type: &str) {
        let prefix = format!("{action_type}:");
        self.cache.lock().retain(|key, _| !key.starts_with(&prefix));
    }
}

fn tally(entry: &mut OutcomeTally, success: bool) {
    entry.total += 1;
    if success {
        entry.success += 1;
    } else {
        entry.failure += 1;
    }
}

/// Builds the cache key exactly as the original system does: the
/// action type plus the first 100 *characters* of the context,
/// sliced on a `char` boundary so multi-byte UTF-8 never panics.
fn cache_key(action_type: &str, context: &str) -> String {
    let truncated: String = context.chars().take(100).collect();
    format!("{action_type}:{truncated}")
}

fn generate_reason(action_type: &str, confidence: &ConfidenceScore) -> String {
    if confidence.success_rate >= 0.9 {
        format!(
            "This {action_type} action has a {:.0}% success rate across {} similar situations.",
            confidence.success_rate * 100.0,
            confidence.sample_count
        )
    } else if confidence.success_rate >= 0.7 {
        format!(
            "This {action_type} action usually works ({:.0}% success rate) with an average execution time of {:.0}ms.",
            confidence.success_rate * 100.0,
            confidence.avg_duration_ms
        )
    } else {
        format!(
            "This {action_type} action has worked in similar contexts, though with mixed results ({:.0}% success rate).",
            confidence.success_rate * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_memory::InMemorySemanticMemory;

    fn record(action_type: &str, context: &str, success: bool, duration_ms: u64) -> ActionRecord {
        ActionRecord {
            action_id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            goal_id: "goal-1".to_string(),
            context: context.to_string(),
            success,
            duration_ms,
            timestamp: Utc::now(),
            error_message: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn insufficient_samples_yields_zero_score() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        memory
            .store_action(&record("restart_service", "website down", true, 50))
            .await
            .unwrap();

        let engine = LearningEngine::new(memory);
        let score = engine.get_confidence("restart_service", "website down").await;
        assert_eq!(score.score, 0.0);
        assert!(!score.has_sufficient_data());
    }

    #[tokio::test]
    async fn confidence_rises_with_consistent_successes() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..5 {
            memory
                .store_action(&record("restart_service", "website down", true, 50))
                .await
                .unwrap();
        }

        let engine = LearningEngine::new(memory);
        let score = engine.get_confidence("restart_service", "website down").await;
        assert!(score.has_sufficient_data());
        assert!(score.score > 0.5, "expected high confidence, got {}", score.score);
    }

    #[tokio::test]
    async fn cache_is_invalidated_for_the_recorded_action_type() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..5 {
            memory
                .store_action(&record("restart_service", "website down", true, 50))
                .await
                .unwrap();
        }
        let engine = LearningEngine::new(memory);
        let first = engine.get_confidence("restart_service", "website down").await;
        assert!(engine.cached(&cache_key("restart_service", "website down")).is_some());

        engine
            .record_action(
                "restart_service",
                "goal-1",
                "website down",
                false,
                10,
                Some("boom".into()),
                serde_json::Map::new(),
            )
            .await;

        assert!(engine.cached(&cache_key("restart_service", "website down")).is_none());
        let _ = first;
    }

    #[tokio::test]
    async fn confidence_weighs_failures_more_heavily_than_successes() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::new(100));
        for _ in 0..4 {
            memory
                .store_action(&record("restart_service", "website down", true, 50))
                .await
                .unwrap();
        }
        memory
            .store_action(&record("restart_service", "website down", false, 50))
            .await
            .unwrap();

        let engine = LearningEngine::new(memory);
        let score = engine.get_confidence("restart_service", "website down").await;

        // weighted_success = 4 * 1.0, total_weight = 4 * 1.0 + 1 * 1.5 = 5.5
        assert!((score.score - 4.0 / 5.5).abs() < 1e-9, "got {}", score.score);
        assert_eq!(score.sample_count, 5);
    }
}
