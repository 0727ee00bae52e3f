//! In-process cache store.
//!
//! Same contract as [`DiskCache`](super::DiskCache) without persistence;
//! useful for tests and throwaway runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::storage::{CacheEntry, CacheStats, CacheStore};

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, CacheEntry>) -> T) -> T {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        Ok(self.with_entries(|entries| {
            if entries.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
                entries.remove(key);
            }
            entries.get(key).cloned()
        }))
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let entry = CacheEntry::new(key, value, ttl, Utc::now())?;
        self.with_entries(|entries| entries.insert(key.to_string(), entry));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| entries.remove(key));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.with_entries(|entries| entries.clear());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        Ok(self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            before - entries.len()
        }))
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.with_entries(|entries| CacheStats {
            entries: entries.len(),
            bytes: entries
                .values()
                .map(|e| e.value.to_string().len() as u64)
                .sum(),
        }))
    }
}
