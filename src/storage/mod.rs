//! Storage abstractions: the key/value cache behind memoization and
//! checkpoints, and the sinks that receive the final event set.
//!
//! ## Cache Layout
//!
//! ```text
//! {cache_dir}/
//! └── entries/
//!     ├── 3f1c...e9.json    # one CacheEntry per key, named by SHA-256(key)
//!     └── a07b...12.json
//! ```
//!
//! ## Export Layout
//!
//! ```text
//! {output_dir}/
//! ├── latest.json                     # most recent run
//! └── events_20250801_103000_125.json # one file per run
//! ```

pub mod disk;
pub mod export;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ProcessedEvent;

// Re-export for convenience
pub use disk::DiskCache;
pub use export::JsonExporter;
pub use memory::MemoryCache;

/// A stored value with its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Absent means the entry never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Build an entry created `now`, expiring after `ttl` if given.
    pub fn new(
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl).map_err(AppError::cache)?;
                Some(now + ttl)
            }
            None => None,
        };
        Ok(Self {
            key: key.into(),
            value,
            created_at: now,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Age of the entry in hours at `now`.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds() as f64 / 3600.0
    }
}

/// Summary of what a store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

/// Key/value store with per-entry expiry.
///
/// Implementations must tolerate concurrent calls from every worker; a
/// reader sees either the previous or the new value of a key, never a
/// partial write. No cross-key atomicity is offered.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store a value; `ttl = None` stores it without expiry.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>)
    -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;

    async fn stats(&self) -> Result<CacheStats>;
}

/// Kind of downstream collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStage {
    Translation,
    Images,
    Export,
}

/// Receives the final, deduplicated event set.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    fn stage(&self) -> SinkStage;

    /// Consume the events, returning how many were accepted.
    async fn accept(&self, events: &[ProcessedEvent]) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_without_ttl_never_expires() {
        let now = Utc::now();
        let entry = CacheEntry::new("checkpoint:x", json!(1), None, now).unwrap();
        assert!(!entry.is_expired_at(now + chrono::Duration::days(3650)));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let now = Utc::now();
        let entry =
            CacheEntry::new("source:a", json!([]), Some(Duration::from_secs(1)), now).unwrap();
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + chrono::Duration::seconds(2)));
    }
}
