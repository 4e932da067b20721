use serde::{Deserialize, Serialize};

/// How much latitude a goal's action is given before the decision
/// layer requires human sign-off. Higher risk raises the confidence
/// bar an action's learned track record must clear to run unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only or easily reversible actions.
    Low,
    /// Default for most automated actions.
    Medium,
    /// Actions with real external side effects.
    High,
    /// Actions that are expensive or impossible to undo.
    Critical,
}

impl RiskLevel {
    /// Minimum confidence score the decision engine requires for this
    /// risk tier, before also applying the goal's own
    /// `confidence_threshold`.
    #[must_use]
    pub const fn threshold(self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Medium => 0.75,
            Self::High => 0.9,
            Self::Critical => 1.0,
        }
    }

    /// Lowercase name, matching the YAML spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Medium
    }
}
