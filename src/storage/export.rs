//! JSON snapshot export of the final event set.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::ProcessedEvent;
use crate::storage::{EventSink, SinkStage};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Contents of an export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    /// ISO 8601 timestamp of the export
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub events: Vec<ProcessedEvent>,
}

impl ExportData {
    pub fn new(events: Vec<ProcessedEvent>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: events.len(),
            events,
        }
    }
}

/// Writes `events_<timestamp>.json` and `latest.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    root_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to a unique temp file, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(key);
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{}-{}", std::process::id(), n));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(path)
    }

    /// First free `events_<timestamp>[_n].json` name.
    async fn snapshot_name(&self, at: DateTime<Utc>) -> Result<String> {
        let stem = format!("events_{}", at.format("%Y%m%d_%H%M%S_%3f"));
        let mut name = format!("{stem}.json");
        let mut n = 1;
        while tokio::fs::try_exists(self.path(&name)).await? {
            name = format!("{stem}_{n}.json");
            n += 1;
        }
        Ok(name)
    }

    /// Load the most recent export, if any.
    pub async fn load_latest(&self) -> Result<Option<ExportData>> {
        read_json(&self.path("latest.json")).await
    }
}

async fn read_json(path: &Path) -> Result<Option<ExportData>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

#[async_trait]
impl EventSink for JsonExporter {
    fn name(&self) -> &str {
        "json-export"
    }

    fn stage(&self) -> SinkStage {
        SinkStage::Export
    }

    async fn accept(&self, events: &[ProcessedEvent]) -> Result<usize> {
        let data = ExportData::new(events.to_vec());
        let bytes = serde_json::to_vec_pretty(&data)?;

        let stamped = self.snapshot_name(data.updated_at).await?;
        let path = self.write_bytes(&stamped, &bytes).await?;
        self.write_bytes("latest.json", &bytes).await?;

        log::info!("Exported {} events to {}", data.count, path.display());
        Ok(data.count)
    }
}
