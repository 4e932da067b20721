#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! The semantic-memory collaborator boundary.
//!
//! The production system stores action history and retrieves similar
//! past actions through an external semantic-memory service (vector
//! search over free-text descriptions). That service is explicitly out
//! of scope here: this crate only defines the [`SemanticMemory`] trait
//! the rest of the runtime is written against, plus two concrete
//! implementations useful for tests and local demos — neither is a
//! production vector store.

mod in_memory;
mod jsonl;

pub use in_memory::InMemorySemanticMemory;
pub use jsonl::JsonlSemanticMemory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fixed collection names the runtime reads from and writes to.
pub mod collections {
    /// Past action outcomes, queried by the learning engine.
    pub const LEARNING: &str = "agent-learning";
    /// Persisted goal definitions.
    pub const GOALS: &str = "agent-goals";
    /// Operator/owner preferences.
    pub const PREFERENCES: &str = "agent-preferences";
    /// Conversational history with the agent.
    pub const CONVERSATIONS: &str = "agent-conversations";
    /// Miscellaneous agent state snapshots.
    pub const STATE: &str = "agent-state";
    /// Reusable action blueprints.
    pub const BLUEPRINTS: &str = "agent-blueprints";
}

/// Record of an executed action, persisted for future confidence lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Unique identifier for this record.
    pub action_id: Uuid,
    /// Action type (e.g. `shell`, `notify`, `http`, `agent`).
    pub action_type: String,
    /// Goal that triggered the action.
    pub goal_id: String,
    /// Free-text description of what was done, used as the similarity query.
    pub context: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Execution time in milliseconds.
    pub duration_ms: u64,
    /// When the action was recorded.
    pub timestamp: DateTime<Utc>,
    /// Error details if the action failed.
    pub error_message: Option<String>,
    /// Additional structured metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A single semantic-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResult {
    /// The stored text content that matched.
    pub content: String,
    /// Similarity score in `[0, 1]`, higher is more similar.
    pub score: f32,
    /// Structured metadata attached when the memory was stored.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Collection the hit came from.
    #[serde(default)]
    pub collection: String,
}

/// Errors surfaced by a [`SemanticMemory`] implementation.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backing store could not be reached or returned an error.
    #[error("semantic memory unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Word-overlap similarity score used by the bundled fakes: the
/// fraction of query words also present in `context`. Not a
/// substitute for real embedding similarity, but deterministic and
/// dependency-free.
pub(crate) fn word_overlap_score(query: &str, context: &str) -> f32 {
    let query_words: std::collections::HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let context_words: std::collections::HashSet<String> = context
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let overlap = query_words.intersection(&context_words).count();
    overlap as f32 / query_words.len() as f32
}

/// The semantic-memory collaborator interface consumed by the learning
/// engine. Implementations are expected to be cheap to clone (or
/// already behind an `Arc`) and safe to share across tasks.
#[async_trait]
pub trait SemanticMemory: Send + Sync {
    /// Persists an action outcome for future similarity search.
    async fn store_action(&self, record: &ActionRecord) -> Result<(), MemoryError>;

    /// Finds memories similar to `query` within `collection`, scoring
    /// at least `min_score`, returning at most `limit` results.
    async fn find_memories(
        &self,
        query: &str,
        limit: usize,
        collection: &str,
        min_score: f32,
    ) -> Result<Vec<MemoryResult>, MemoryError>;
}
