use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::{ActionRecord, MemoryError, MemoryResult, SemanticMemory};

/// Deterministic in-memory fake of the semantic-memory collaborator.
///
/// Stores records in a bounded ring buffer and scores similarity by
/// word overlap between the query and each record's context string.
/// Good enough for unit tests and local demos; not a real vector
/// store.
#[derive(Debug)]
pub struct InMemorySemanticMemory {
    capacity: usize,
    records: RwLock<VecDeque<(String, ActionRecord)>>,
}

impl InMemorySemanticMemory {
    /// Creates a store retaining at most `capacity` records per process.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn record_to_result(collection: &str, record: &ActionRecord, score: f32) -> MemoryResult {
        let metadata = json!({
            "action_type": record.action_type,
            "goal_id": record.goal_id,
            "success": record.success,
            "duration_ms": record.duration_ms,
            "timestamp": record.timestamp.to_rfc3339(),
        });
        let mut metadata = match metadata {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in &record.metadata {
            metadata.entry(key.clone()).or_insert_with(|| value.clone());
        }
        MemoryResult {
            content: record.context.clone(),
            score,
            metadata,
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl SemanticMemory for InMemorySemanticMemory {
    async fn store_action(&self, record: &ActionRecord) -> Result<(), MemoryError> {
        let mut records = self.records.write();
        records.push_back((crate::collections::LEARNING.to_string(), record.clone()));
        while records.len() > self.capacity {
            records.pop_front();
        }
        Ok(())
    }

    async fn find_memories(
        &self,
        query: &str,
        limit: usize,
        collection: &str,
        min_score: f32,
    ) -> Result<Vec<MemoryResult>, MemoryError> {
        let records = self.records.read();
        let mut scored: Vec<MemoryResult> = records
            .iter()
            .filter(|(stored_collection, _)| stored_collection == collection)
            .filter_map(|(stored_collection, record)| {
                let score = crate::word_overlap_score(query, &record.context);
                (score >= min_score).then(|| Self::record_to_result(stored_collection, record, score))
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(action_type: &str, goal_id: &str, context: &str, success: bool) -> ActionRecord {
        ActionRecord {
            action_id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            goal_id: goal_id.to_string(),
            context: context.to_string(),
            success,
            duration_ms: 120,
            timestamp: chrono::Utc::now(),
            error_message: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn finds_similar_records_above_threshold() {
        let store = InMemorySemanticMemory::new(100);
        store
            .store_action(&record("shell", "restart-service", "restart nginx service", true))
            .await
            .unwrap();
        store
            .store_action(&record("shell", "restart-service", "completely unrelated text", true))
            .await
            .unwrap();

        let hits = store
            .find_memories("restart nginx", 10, crate::collections::LEARNING, 0.3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("nginx"));
    }

    #[tokio::test]
    async fn evicts_oldest_past_capacity() {
        let store = InMemorySemanticMemory::new(2);
        for i in 0..5 {
            store
                .store_action(&record("shell", "g", &format!("action {i}"), true))
                .await
                .unwrap();
        }
        let hits = store
            .find_memories("action", 10, crate::collections::LEARNING, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
