//! Per-run counters and the end-of-run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for a single run.
///
/// Created at run start, written only by the coordinating task, and read-only
/// once the run has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub sources_total: usize,
    pub sources_scraped: usize,
    pub sources_cached: usize,
    pub sources_failed: usize,
    pub sources_skipped: usize,
    pub sources_cancelled: usize,
    pub fetch_attempts: usize,

    pub events_total: usize,
    pub events_valid: usize,
    pub events_invalid: usize,
    pub events_duplicate: usize,
    pub events_exported: usize,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Fresh counters stamped with the current time.
    pub fn start() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall time in seconds, if both ends are known.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Sources that produced a result, fresh or cached.
    pub fn sources_completed(&self) -> usize {
        self.sources_scraped + self.sources_cached
    }
}

/// A source that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSource {
    pub source_id: String,
    pub source_name: String,
    pub error: String,
}

/// An event dropped by validation, with every reason found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub title: String,
    pub source_id: Option<String>,
    pub reasons: Vec<String>,
}

/// Everything a finished run hands back to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: RunStats,
    pub failures: Vec<FailedSource>,
    pub rejections: Vec<Rejection>,
    /// Downstream stages that failed, as `stage: error`
    pub sink_errors: Vec<String>,
    pub cancelled: bool,
}

impl RunReport {
    /// Log the end-of-run summary block.
    pub fn log_summary(&self) {
        let s = &self.stats;
        let border = "=".repeat(60);

        log::info!("{}", border);
        log::info!("HARVEST SUMMARY");
        log::info!("{}", border);
        if let Some(secs) = s.duration_secs() {
            log::info!("Duration: {:.2} seconds", secs);
        }
        log::info!(
            "Sources completed: {}/{}",
            s.sources_completed(),
            s.sources_total
        );
        log::info!("Sources scraped: {}", s.sources_scraped);
        log::info!("Sources from cache: {}", s.sources_cached);
        log::info!("Sources failed: {}", s.sources_failed);
        log::info!("Sources skipped: {}", s.sources_skipped);
        if s.sources_cancelled > 0 {
            log::info!("Sources cancelled: {}", s.sources_cancelled);
        }
        log::info!("Fetch attempts: {}", s.fetch_attempts);
        log::info!("Events scraped: {}", s.events_total);
        log::info!("Events valid: {}", s.events_valid);
        log::info!("Events invalid: {}", s.events_invalid);
        log::info!("Duplicates removed: {}", s.events_duplicate);
        log::info!("Events exported: {}", s.events_exported);
        log::info!("{}", border);

        if !self.failures.is_empty() {
            log::warn!("Failed sources ({}):", self.failures.len());
            for failed in &self.failures {
                log::warn!("  - {} [{}]: {}", failed.source_name, failed.source_id, failed.error);
            }
        }

        for err in &self.sink_errors {
            log::warn!("Downstream stage failed: {}", err);
        }

        if self.cancelled {
            log::warn!("Run was cancelled before all sources completed");
        }
    }
}
