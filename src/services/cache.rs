// src/services/cache.rs

//! Cache facade used by the orchestrator and fetchers.
//!
//! Wraps an optional [`CacheStore`]; when caching is disabled every lookup
//! misses and every write is a no-op. Storage errors are logged and treated
//! the same way, so a broken cache never aborts a run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{CacheConfig, RawEvent};
use crate::storage::{CacheEntry, CacheStats, CacheStore};

/// Stable hash of the given parts, used as a key suffix.
pub fn generate_key(parts: &[&str]) -> String {
    hex::encode(Sha256::digest(parts.join("|").as_bytes()))
}

/// Key for memoizing an operation called with the given arguments.
pub fn operation_key(operation: &str, parts: &[&str]) -> String {
    format!("{}:{}", operation, generate_key(parts))
}

pub fn url_key(url: &str) -> String {
    operation_key("url", &[url])
}

pub fn source_key(source_id: &str) -> String {
    format!("source:{source_id}")
}

/// Cached result of one source fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCacheRecord {
    pub events: Vec<RawEvent>,
    pub cached_at: DateTime<Utc>,
    pub count: usize,
}

#[derive(Clone)]
pub struct CacheManager {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
        }
    }

    /// Build from config; a disabled cache ignores the store.
    pub fn from_config(store: Option<Arc<dyn CacheStore>>, config: &CacheConfig) -> Self {
        let store = if config.enabled { store } else { None };
        log::info!("Cache manager initialized (enabled: {})", store.is_some());
        Self {
            store,
            ttl: config.ttl(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Default lifetime for memoized results.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(entry)) => {
                log::debug!("Cache hit: {}", key);
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                log::error!("Cache get error for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Typed lookup; a payload that no longer deserializes is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        decode(key, value)
    }

    /// Store a value; `ttl = None` stores it without expiry.
    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.set(key, value, ttl).await {
            Ok(()) => log::debug!("Cache set: {} (expire: {:?})", key, ttl),
            Err(e) => log::error!("Cache set error for {}: {}", key, e),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if !self.is_enabled() {
            return;
        }
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl).await,
            Err(e) => log::error!("Cache encode error for {}: {}", key, e),
        }
    }

    pub async fn delete(&self, key: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.delete(key).await {
            Ok(()) => log::debug!("Cache delete: {}", key),
            Err(e) => log::error!("Cache delete error for {}: {}", key, e),
        }
    }

    /// Remove expired entries, returning how many went.
    pub async fn cleanup_expired(&self) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        match store.purge_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    log::info!("Cleaned up {} expired cache entries", removed);
                }
                removed
            }
            Err(e) => {
                log::error!("Cache cleanup error: {}", e);
                0
            }
        }
    }

    pub async fn stats(&self) -> Option<CacheStats> {
        let store = self.store.as_ref()?;
        match store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                log::error!("Cache stats error: {}", e);
                None
            }
        }
    }

    /// Memoize `compute` under `key`: lookup, then compute, then store.
    ///
    /// Errors from `compute` are returned and never cached.
    pub async fn cached<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get_json::<T>(key).await {
            return Ok(hit);
        }

        let value = compute().await?;
        self.set_json(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn cache_source_events(&self, source_id: &str, events: &[RawEvent]) {
        let record = SourceCacheRecord {
            events: events.to_vec(),
            cached_at: Utc::now(),
            count: events.len(),
        };
        self.set_json(&source_key(source_id), &record, Some(self.ttl))
            .await;
    }

    pub async fn get_cached_source_events(&self, source_id: &str) -> Option<Vec<RawEvent>> {
        let key = source_key(source_id);
        let entry = self.get_entry(&key).await?;
        let age_hours = entry.age_hours(Utc::now());
        let record: SourceCacheRecord = decode(&key, entry.value)?;
        log::info!(
            "Using cached events for {} ({} events, {:.1}h old)",
            source_id,
            record.count,
            age_hours
        );
        Some(record.events)
    }
}

/// A payload that no longer deserializes is treated as a miss.
fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(typed) => Some(typed),
        Err(e) => {
            log::warn!("Discarding undecodable cache entry {}: {}", key, e);
            None
        }
    }
}
