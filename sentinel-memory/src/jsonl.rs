use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{ActionRecord, MemoryError, MemoryResult, SemanticMemory};

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    collection: String,
    record: ActionRecord,
}

/// File-backed fake of the semantic-memory collaborator.
///
/// Appends every stored action to a single JSON-lines file per
/// collection under `base_path`, and scans that file on each search.
/// Useful for local manual runs of the CLI where state should survive
/// a restart; still not a production vector store.
#[derive(Debug)]
pub struct JsonlSemanticMemory {
    base_path: PathBuf,
    writer: Mutex<()>,
}

impl JsonlSemanticMemory {
    /// Creates a store rooted at `base_path`, creating the directory
    /// if it does not already exist.
    pub fn new(base_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            writer: Mutex::new(()),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{collection}.jsonl"))
    }

    fn append(&self, collection: &str, record: &ActionRecord) -> anyhow::Result<()> {
        let _guard = self.writer.lock();
        let path = self.collection_path(collection);
        let mut file: File = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(&StoredRecord {
            collection: collection.to_string(),
            record: record.clone(),
        })?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn read_all(&self, collection: &str) -> anyhow::Result<Vec<ActionRecord>> {
        let path = self.collection_path(collection);
        if !Path::new(&path).exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredRecord = serde_json::from_str(&line)?;
            out.push(stored.record);
        }
        Ok(out)
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
        serde_json::Value::Object(map) => map,
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

#[async_trait]
impl SemanticMemory for JsonlSemanticMemory {
    async fn store_action(&self, record: &ActionRecord) -> Result<(), MemoryError> {
        self.append(crate::collections::LEARNING, record)
            .map_err(MemoryError::Unavailable)
    }

    async fn find_memories(
        &self,
        query: &str,
        limit: usize,
        collection: &str,
        min_score: f32,
    ) -> Result<Vec<MemoryResult>, MemoryError> {
        let records = self.read_all(collection).map_err(MemoryError::Unavailable)?;
        let mut scored: Vec<MemoryResult> = records
            .iter()
            .filter_map(|record| {
                let score = crate::word_overlap_score(query, &record.context);
                (score >= min_score).then(|| record_to_result(collection, record, score))
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
    use tempfile::tempdir;
    use uuid::Uuid;

    fn record(context: &str, success: bool) -> ActionRecord {
        ActionRecord {
            action_id: Uuid::new_v4(),
            action_type: "shell".to_string(),
            goal_id: "goal-1".to_string(),
            context: context.to_string(),
            success,
            duration_ms: 50,
            timestamp: chrono::Utc::now(),
            error_message: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn persists_and_replays_across_instances() {
        let dir = tempdir().unwrap();
        {
            let store = JsonlSemanticMemory::new(dir.path()).unwrap();
            store
                .store_action(&record("restart nginx service", true))
                .await
                .unwrap();
        }
        let store = JsonlSemanticMemory::new(dir.path()).unwrap();
        let hits = store
            .find_memories("restart nginx", 10, crate::collections::LEARNING, 0.3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
