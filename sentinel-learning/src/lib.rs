#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Learns from recorded action outcomes. Confidence is computed from
//! similarity-weighted, recency-decayed, failure-penalized history
//! pulled from a [`sentinel_memory::SemanticMemory`] collaborator —
//! this crate never stores anything itself.

mod confidence;
mod engine;

pub use confidence::{ConfidenceScore, Recommendation};
pub use engine::{DailySummary, LearningEngine, LearningEngineConfig, OutcomeTally};
