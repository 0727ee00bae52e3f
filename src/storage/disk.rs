//! Persistent cache store on the local filesystem.
//!
//! Each entry is a JSON file named by the SHA-256 of its key, so state
//! survives restarts. Writes go to a unique temp file and are renamed into
//! place; readers therefore see the old or the new entry, never a torn one.
//!
//! ## Eviction
//!
//! When the total size exceeds the configured bound, entries are removed in
//! this order until it fits again:
//!
//! 1. expired entries
//! 2. expiring entries, least recently used first
//! 3. non-expiring entries (checkpoints), least recently used first
//!
//! The entry just written is never evicted by its own write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{CacheEntry, CacheStats, CacheStore};

const ENTRIES_DIR: &str = "entries";

/// Index record kept in memory for every entry on disk.
#[derive(Debug, Clone)]
struct EntryMeta {
    size: u64,
    expires_at: Option<DateTime<Utc>>,
    last_access: DateTime<Utc>,
}

impl EntryMeta {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Lower ranks are evicted first.
    fn eviction_rank(&self, now: DateTime<Utc>) -> (u8, DateTime<Utc>) {
        let class = if self.is_expired_at(now) {
            0
        } else if self.expires_at.is_some() {
            1
        } else {
            2
        };
        (class, self.last_access)
    }
}

/// Local filesystem cache backend.
#[derive(Debug)]
pub struct DiskCache {
    root_dir: PathBuf,
    max_size_bytes: u64,
    index: Mutex<HashMap<String, EntryMeta>>,
    tmp_counter: AtomicU64,
}

impl DiskCache {
    /// Open (or create) a cache rooted at the given directory.
    ///
    /// Existing entries are indexed; unreadable files are removed.
    pub async fn open(root_dir: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self> {
        let root_dir = root_dir.into();
        let entries_dir = root_dir.join(ENTRIES_DIR);
        tokio::fs::create_dir_all(&entries_dir).await?;

        let mut index = HashMap::new();
        let mut dir = tokio::fs::read_dir(&entries_dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                // Leftover temp file from an interrupted write
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }

            match Self::read_entry_file(&path).await {
                Ok(Some((entry, size))) => {
                    index.insert(
                        entry.key.clone(),
                        EntryMeta {
                            size,
                            expires_at: entry.expires_at,
                            last_access: entry.created_at,
                        },
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Dropping unreadable cache file {}: {}", path.display(), e);
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        log::debug!(
            "Opened disk cache at {} ({} entries)",
            root_dir.display(),
            index.len()
        );

        Ok(Self {
            root_dir,
            max_size_bytes,
            index: Mutex::new(index),
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn with_index<T>(&self, f: impl FnOnce(&mut HashMap<String, EntryMeta>) -> T) -> T {
        let mut guard = self.index.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Get the file path for a key.
    fn path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root_dir
            .join(ENTRIES_DIR)
            .join(format!("{digest}.json"))
    }

    /// Write bytes atomically (write to a unique temp file, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{n}"));

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Read an entry file, returning None if it doesn't exist.
    async fn read_entry_file(path: &Path) -> Result<Option<(CacheEntry, u64)>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let entry: CacheEntry = serde_json::from_slice(&bytes)?;
                Ok(Some((entry, bytes.len() as u64)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn remove_file(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Pick entries to drop so the total fits under the bound.
    fn eviction_candidates(&self, keep: &str, now: DateTime<Utc>) -> Vec<String> {
        self.with_index(|index| {
            let mut total: u64 = index.values().map(|m| m.size).sum();
            if total <= self.max_size_bytes {
                return Vec::new();
            }

            let mut ranked: Vec<(&String, &EntryMeta)> =
                index.iter().filter(|(k, _)| k.as_str() != keep).collect();
            ranked.sort_by_key(|(_, meta)| meta.eviction_rank(now));

            let mut victims = Vec::new();
            for (key, meta) in ranked {
                if total <= self.max_size_bytes {
                    break;
                }
                total = total.saturating_sub(meta.size);
                victims.push(key.clone());
            }
            for key in &victims {
                index.remove(key);
            }
            victims
        })
    }

    async fn evict(&self, keep: &str) -> Result<usize> {
        let victims = self.eviction_candidates(keep, Utc::now());
        for key in &victims {
            self.remove_file(key).await?;
        }
        if !victims.is_empty() {
            log::debug!("Evicted {} cache entries to stay under size bound", victims.len());
        }
        Ok(victims.len())
    }
}

#[async_trait]
impl CacheStore for DiskCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path(key);
        let Some((entry, _)) = Self::read_entry_file(&path).await? else {
            self.with_index(|index| index.remove(key));
            return Ok(None);
        };

        // Hash collision guard
        if entry.key != key {
            return Ok(None);
        }

        let now = Utc::now();
        if entry.is_expired_at(now) {
            self.with_index(|index| index.remove(key));
            self.remove_file(key).await?;
            return Ok(None);
        }

        self.with_index(|index| {
            if let Some(meta) = index.get_mut(key) {
                meta.last_access = now;
            }
        });
        Ok(Some(entry))
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = Utc::now();
        let entry = CacheEntry::new(key, value, ttl, now)?;
        let bytes = serde_json::to_vec(&entry)?;
        self.write_bytes(&self.path(key), &bytes).await?;

        self.with_index(|index| {
            index.insert(
                key.to_string(),
                EntryMeta {
                    size: bytes.len() as u64,
                    expires_at: entry.expires_at,
                    last_access: now,
                },
            )
        });

        self.evict(key).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_index(|index| index.remove(key));
        self.remove_file(key).await
    }

    async fn clear(&self) -> Result<()> {
        let keys: Vec<String> = self.with_index(|index| index.drain().map(|(k, _)| k).collect());
        for key in &keys {
            self.remove_file(key).await?;
        }
        log::info!("Cache cleared ({} entries)", keys.len());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let expired: Vec<String> = self.with_index(|index| {
            let keys: Vec<String> = index
                .iter()
                .filter(|(_, meta)| meta.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                index.remove(key);
            }
            keys
        });

        for key in &expired {
            self.remove_file(key).await?;
        }
        Ok(expired.len())
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.with_index(|index| CacheStats {
            entries: index.len(),
            bytes: index.values().map(|m| m.size).sum(),
        }))
    }
}
