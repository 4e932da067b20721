use chrono::{DateTime, Utc};
use sentinel_memory::MemoryResult;
use serde::Serialize;

/// Minimum sample count `ConfidenceScore::has_sufficient_data` requires,
/// independent of whatever `min_samples` a particular engine is configured with.
const MIN_SAMPLES_FOR_SUFFICIENT_DATA: usize = 3;

/// A confidence estimate for an action type, derived from its recorded
/// track record in similar contexts.
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceScore {
    /// Weighted success confidence in `[0, 1]`.
    pub score: f64,
    /// Number of similar past actions the score is based on.
    pub sample_count: usize,
    /// Unweighted fraction of samples that succeeded.
    pub success_rate: f64,
    /// Average execution time across the samples.
    pub avg_duration_ms: f64,
    /// Most recent success timestamp, if any.
    pub last_success: Option<DateTime<Utc>>,
    /// Most recent failure timestamp, if any.
    pub last_failure: Option<DateTime<Utc>>,
    /// Up to 5 of the samples the score was computed from.
    pub similar_actions: Vec<MemoryResult>,
}

impl ConfidenceScore {
    /// Whether enough samples were found to treat this score as meaningful.
    #[must_use]
    pub const fn has_sufficient_data(&self) -> bool {
        self.sample_count >= MIN_SAMPLES_FOR_SUFFICIENT_DATA
    }

    /// An empty score for when there isn't enough history, or the
    /// memory backend couldn't be reached.
    #[must_use]
    pub fn insufficient(sample_count: usize, similar_actions: Vec<MemoryResult>) -> Self {
        Self {
            score: 0.0,
            sample_count,
            success_rate: 0.0,
            avg_duration_ms: 0.0,
            last_success: None,
            last_failure: None,
            similar_actions,
        }
    }
}

/// A learning-derived suggestion for how to handle a situation.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    /// The recommended action type.
    pub action_type: String,
    /// The situation this was recommended for.
    pub context: String,
    /// Confidence backing the recommendation.
    pub confidence: f64,
    /// Human-readable justification.
    pub reason: String,
    /// Sample of the supporting history (up to 3 entries).
    pub supporting_actions: Vec<MemoryResult>,
}
