//! Durable run-recovery records.
//!
//! Checkpoints live in the same store as memoized results under the
//! `checkpoint:` namespace and never expire; the owner deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::services::CacheManager;

/// Checkpoint id used by the orchestrator.
pub const HARVEST_CHECKPOINT: &str = "harvest";

/// Stored shape of a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

/// Progress of a harvest run, saved after each completed source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RunCheckpoint {
    pub fn record_completed(&mut self, source_id: &str) {
        self.failed.retain(|id| id != source_id);
        if !self.is_completed(source_id) {
            self.completed.push(source_id.to_string());
        }
        self.updated_at = Some(Utc::now());
    }

    pub fn record_failed(&mut self, source_id: &str) {
        if !self.failed.iter().any(|id| id == source_id) {
            self.failed.push(source_id.to_string());
        }
        self.updated_at = Some(Utc::now());
    }

    pub fn is_completed(&self, source_id: &str) -> bool {
        self.completed.iter().any(|id| id == source_id)
    }
}

pub fn checkpoint_key(id: &str) -> String {
    format!("checkpoint:{id}")
}

#[derive(Clone)]
pub struct CheckpointManager {
    cache: CacheManager,
}

impl CheckpointManager {
    pub fn new(cache: CacheManager) -> Self {
        Self { cache }
    }

    pub async fn save<T: Serialize>(&self, id: &str, data: &T) {
        let record = CheckpointRecord {
            data,
            timestamp: Utc::now(),
        };
        self.cache.set_json(&checkpoint_key(id), &record, None).await;
        log::debug!("Checkpoint saved: {}", id);
    }

    pub async fn load<T: DeserializeOwned>(&self, id: &str) -> Option<T> {
        let record: CheckpointRecord<T> = self.cache.get_json(&checkpoint_key(id)).await?;
        log::info!("Checkpoint loaded: {} (saved {})", id, record.timestamp);
        Some(record.data)
    }

    pub async fn delete(&self, id: &str) {
        self.cache.delete(&checkpoint_key(id)).await;
        log::debug!("Checkpoint deleted: {}", id);
    }
}
