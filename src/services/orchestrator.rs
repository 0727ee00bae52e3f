// src/services/orchestrator.rs

//! Source orchestration.
//!
//! Runs every source through cache lookup, reachability probe and a
//! retried fetch on a bounded pool of concurrent tasks. A single
//! coordinator loop drains the results and owns the aggregate list, the
//! failure list and the run counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, FailedSource, RawEvent, RunStats, SourceDescriptor};
use crate::services::checkpoint::{HARVEST_CHECKPOINT, RunCheckpoint};
use crate::services::{CacheManager, CheckpointManager, FetcherRegistry, RetryPolicy};

/// How a single source ended.
#[derive(Debug)]
pub enum SourceOutcome {
    Fetched(Vec<RawEvent>),
    Cached(Vec<RawEvent>),
    /// Probe failed and unreachable sources are skipped
    Skipped(String),
    Failed(AppError),
    Cancelled,
}

#[derive(Debug)]
struct SourceResult {
    position: usize,
    source: SourceDescriptor,
    outcome: SourceOutcome,
    attempts: u32,
}

/// Aggregated result of fetching every source.
#[derive(Debug, Default)]
pub struct HarvestOutcome {
    /// Raw events in catalog order
    pub events: Vec<RawEvent>,
    pub failures: Vec<FailedSource>,
    pub cancelled: bool,
}

/// Result of probing one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn reachable(&self) -> bool {
        self.error.is_none()
    }
}

/// Schedules source fetches.
pub struct Orchestrator {
    config: Arc<Config>,
    cache: CacheManager,
    checkpoints: CheckpointManager,
    fetchers: FetcherRegistry,
    retry: RetryPolicy,
    workers: usize,
    fetch_timeout: Duration,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        cache: CacheManager,
        fetchers: FetcherRegistry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config.retry),
            workers: config.worker_count(),
            fetch_timeout: Duration::from_secs(config.performance.fetch_timeout_secs),
            checkpoints: CheckpointManager::new(cache.clone()),
            config,
            cache,
            fetchers,
            cancel,
        }
    }

    /// Override the retry policy used for fetches.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch every source and aggregate their raw events.
    ///
    /// Failures are recorded, never returned; the run always continues
    /// with the remaining sources.
    pub async fn harvest(
        &self,
        sources: &[SourceDescriptor],
        stats: &mut RunStats,
    ) -> HarvestOutcome {
        stats.sources_total = sources.len();
        log::info!(
            "Harvesting {} sources with {} worker(s)",
            sources.len(),
            self.workers
        );

        let mut progress = match self.checkpoints.load::<RunCheckpoint>(HARVEST_CHECKPOINT).await {
            Some(previous) => {
                log::info!(
                    "Resuming interrupted run ({} completed, {} failed)",
                    previous.completed.len(),
                    previous.failed.len()
                );
                previous
            }
            None => RunCheckpoint::default(),
        };

        let mut outcome = HarvestOutcome::default();
        let mut batches: Vec<(usize, Vec<RawEvent>)> = Vec::new();

        let mut results = stream::iter(sources.iter().cloned().enumerate())
            .map(|(position, source)| self.process_source(position, source))
            .buffer_unordered(self.workers);

        while let Some(result) = results.next().await {
            stats.fetch_attempts += result.attempts as usize;
            let source = &result.source;

            match result.outcome {
                SourceOutcome::Fetched(events) => {
                    log::info!("✓ {}: {} events", source.name, events.len());
                    stats.sources_scraped += 1;
                    stats.events_total += events.len();
                    progress.record_completed(&source.id);
                    batches.push((result.position, events));
                }
                SourceOutcome::Cached(events) => {
                    log::info!("✓ {}: {} events (cached)", source.name, events.len());
                    stats.sources_cached += 1;
                    stats.events_total += events.len();
                    progress.record_completed(&source.id);
                    batches.push((result.position, events));
                }
                SourceOutcome::Skipped(reason) => {
                    log::warn!("Skipping {}: {}", source.name, reason);
                    stats.sources_skipped += 1;
                    continue;
                }
                SourceOutcome::Failed(error) => {
                    log::error!("✗ {}: {}", source.name, error);
                    stats.sources_failed += 1;
                    progress.record_failed(&source.id);
                    outcome.failures.push(FailedSource {
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        error: error.to_string(),
                    });
                }
                SourceOutcome::Cancelled => {
                    stats.sources_cancelled += 1;
                    outcome.cancelled = true;
                    continue;
                }
            }

            self.checkpoints.save(HARVEST_CHECKPOINT, &progress).await;
        }

        // Arrival order depends on timing; catalog order does not.
        batches.sort_by_key(|(position, _)| *position);
        outcome.events = batches.into_iter().flat_map(|(_, events)| events).collect();
        outcome
            .failures
            .sort_by_key(|f| sources.iter().position(|s| s.id == f.source_id));

        if outcome.cancelled {
            log::warn!(
                "Run cancelled; {} source(s) not processed",
                stats.sources_cancelled
            );
        } else {
            self.checkpoints.delete(HARVEST_CHECKPOINT).await;
        }

        outcome
    }

    async fn process_source(&self, position: usize, source: SourceDescriptor) -> SourceResult {
        let mut attempts = 0;
        let outcome = self.run_source(&source, &mut attempts).await;
        SourceResult {
            position,
            source,
            outcome,
            attempts,
        }
    }

    /// Cache check, then probe, then retried fetch, then cache write.
    async fn run_source(&self, source: &SourceDescriptor, attempts: &mut u32) -> SourceOutcome {
        if self.cancel.is_cancelled() {
            return SourceOutcome::Cancelled;
        }

        if let Some(events) = self.cache.get_cached_source_events(&source.id).await {
            return SourceOutcome::Cached(events);
        }

        let fetcher = match self.fetchers.get(source.class) {
            Ok(fetcher) => fetcher,
            Err(e) => return SourceOutcome::Failed(e),
        };

        if self.config.health_check.enabled {
            if let Err(e) = fetcher.probe(source).await {
                return if self.config.health_check.skip_failed_sources {
                    SourceOutcome::Skipped(e.to_string())
                } else {
                    SourceOutcome::Failed(e)
                };
            }
        }

        log::info!("Fetching: {} ({})", source.name, source.class);
        let timeout = self.fetch_timeout;
        let result = self
            .retry
            .retry(
                &source.name,
                &self.cancel,
                |attempt| {
                    *attempts = attempt;
                    let fetcher = Arc::clone(&fetcher);
                    async move {
                        match tokio::time::timeout(timeout, fetcher.fetch(source)).await {
                            Ok(result) => result,
                            Err(_) => Err(AppError::Timeout {
                                context: source.id.clone(),
                                secs: timeout.as_secs(),
                            }),
                        }
                    }
                },
                |_, _, _| {},
            )
            .await;

        match result {
            Ok(mut events) => {
                stamp(&mut events, source);
                self.cache.cache_source_events(&source.id, &events).await;
                SourceOutcome::Fetched(events)
            }
            Err(AppError::Cancelled) => SourceOutcome::Cancelled,
            Err(e) => SourceOutcome::Failed(e),
        }
    }

    /// Probe every source without fetching.
    pub async fn probe_all(&self, sources: &[SourceDescriptor]) -> Result<Vec<ProbeResult>> {
        let mut pending = Vec::with_capacity(sources.len());
        for (position, source) in sources.iter().enumerate() {
            pending.push((position, source, self.fetchers.get(source.class)?));
        }

        let mut results: Vec<(usize, ProbeResult)> = stream::iter(pending)
            .map(|(position, source, fetcher)| async move {
                let error = fetcher.probe(source).await.err().map(|e| e.to_string());
                let result = ProbeResult {
                    source_id: source.id.clone(),
                    source_name: source.name.clone(),
                    url: source.url.clone(),
                    error,
                };
                (position, result)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        results.sort_by_key(|(position, _)| *position);
        Ok(results.into_iter().map(|(_, r)| r).collect())
    }

    /// Release fetcher sessions and drop expired cache entries.
    pub async fn cleanup(&self) {
        log::info!("Cleaning up resources...");
        self.fetchers.close_all().await;
        self.cache.cleanup_expired().await;
        if let Some(stats) = self.cache.stats().await {
            log::info!(
                "Cache holds {} entries ({:.2} MB)",
                stats.entries,
                stats.bytes as f64 / (1024.0 * 1024.0)
            );
        }
    }
}

/// Tag raw events with their producing source.
fn stamp(events: &mut [RawEvent], source: &SourceDescriptor) {
    let fetched_at = Utc::now();
    for event in events {
        event.source_id = Some(source.id.clone());
        event.source_name = Some(source.name.clone());
        event.source_url = Some(source.url.clone());
        event.fetched_at = Some(fetched_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceClass;
    use crate::services::SourceFetcher;
    use crate::storage::MemoryCache;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted fetcher: each source id maps to a fixed behavior.
    #[derive(Default)]
    struct ScriptedFetcher {
        events: HashMap<String, Vec<RawEvent>>,
        failing: Vec<String>,
        unreachable: Vec<String>,
        /// Source id that hangs past the fetch timeout
        slow: Option<String>,
        /// Source id whose fetch cancels the run while in flight
        interrupt: Option<(String, CancellationToken)>,
        calls: Mutex<HashMap<String, usize>>,
        closes: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn calls(&self, id: &str) -> usize {
            self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl SourceFetcher for ScriptedFetcher {
        async fn probe(&self, source: &SourceDescriptor) -> Result<()> {
            if self.unreachable.contains(&source.id) {
                return Err(AppError::probe(&source.url, "HTTP 404"));
            }
            Ok(())
        }

        async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawEvent>> {
            *self.calls.lock().unwrap().entry(source.id.clone()).or_default() += 1;
            if let Some((id, token)) = &self.interrupt {
                if *id == source.id {
                    token.cancel();
                }
            }
            if self.slow.as_deref() == Some(source.id.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(&source.id) {
                return Err(AppError::fetch(&source.id, "connection refused"));
            }
            Ok(self.events.get(&source.id).cloned().unwrap_or_default())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source(id: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.into(),
            name: format!("Venue {id}"),
            url: format!("https://{id}.example/"),
            class: SourceClass::Web,
            requires_interactive: false,
            active: true,
        }
    }

    fn test_config(workers: usize) -> Config {
        let mut config = Config::default();
        config.performance.max_workers = workers;
        config.retry.max_retries = 2;
        config.retry.initial_backoff_seconds = 1.0;
        config.retry.max_backoff_seconds = 2.0;
        config.performance.fetch_timeout_secs = 10;
        config
    }

    fn orchestrator(
        config: Config,
        fetcher: Arc<ScriptedFetcher>,
        cache: CacheManager,
    ) -> Orchestrator {
        let registry = FetcherRegistry::new().with(SourceClass::Web, fetcher);
        Orchestrator::new(Arc::new(config), cache, registry, CancellationToken::new())
    }

    fn memory_cache() -> CacheManager {
        CacheManager::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600))
    }

    fn scripted() -> ScriptedFetcher {
        let mut fetcher = ScriptedFetcher::default();
        fetcher
            .events
            .insert("a".into(), vec![RawEvent::titled("Jazz Night"), RawEvent::titled("Blues Night")]);
        fetcher
            .events
            .insert("b".into(), vec![RawEvent::titled("Theatre Evening")]);
        fetcher
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_and_run_continues() {
        let mut fetcher = scripted();
        fetcher.failing.push("bad".into());
        let fetcher = Arc::new(fetcher);
        let orch = orchestrator(test_config(3), fetcher.clone(), memory_cache());

        let mut stats = RunStats::start();
        let outcome = orch
            .harvest(&[source("a"), source("bad"), source("b")], &mut stats)
            .await;

        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_id, "bad");
        assert_eq!(outcome.failures[0].source_name, "Venue bad");
        assert_eq!(stats.sources_scraped, 2);
        assert_eq!(stats.sources_failed, 1);
        // max_retries = 2 → three attempts for the failing source
        assert_eq!(fetcher.calls("bad"), 3);
        assert_eq!(stats.fetch_attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_override_applies_to_fetches() {
        let mut fetcher = scripted();
        fetcher.failing.push("bad".into());
        let fetcher = Arc::new(fetcher);
        let orch = orchestrator(test_config(1), fetcher.clone(), memory_cache())
            .with_retry(RetryPolicy::default().with_max_retries(0));

        let mut stats = RunStats::start();
        orch.harvest(&[source("bad")], &mut stats).await;

        assert_eq!(fetcher.calls("bad"), 1);
        assert_eq!(stats.sources_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_stamped_and_ordered_by_catalog() {
        let fetcher = Arc::new(scripted());
        let orch = orchestrator(test_config(4), fetcher, memory_cache());

        let mut stats = RunStats::start();
        let outcome = orch.harvest(&[source("b"), source("a")], &mut stats).await;

        let titles: Vec<_> = outcome.events.iter().map(|e| e.display_title()).collect();
        assert_eq!(titles, vec!["Theatre Evening", "Jazz Night", "Blues Night"]);
        assert!(outcome.events.iter().all(|e| e.fetched_at.is_some()));
        assert_eq!(outcome.events[0].source_id.as_deref(), Some("b"));
        assert_eq!(outcome.events[1].source_url.as_deref(), Some("https://a.example/"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_served_from_cache() {
        let fetcher = Arc::new(scripted());
        let cache = memory_cache();
        let sources = [source("a"), source("b")];

        let orch = orchestrator(test_config(2), fetcher.clone(), cache.clone());
        let first = orch.harvest(&sources, &mut RunStats::start()).await;

        let mut stats = RunStats::start();
        let second = orch.harvest(&sources, &mut stats).await;

        assert_eq!(first.events, second.events);
        assert_eq!(stats.sources_cached, 2);
        assert_eq!(stats.fetch_attempts, 0);
        assert_eq!(fetcher.calls("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_source_skipped_or_failed_per_config() {
        let mut fetcher = scripted();
        fetcher.unreachable.push("a".into());
        let fetcher = Arc::new(fetcher);

        let orch = orchestrator(test_config(2), fetcher.clone(), CacheManager::disabled());
        let mut stats = RunStats::start();
        let outcome = orch.harvest(&[source("a"), source("b")], &mut stats).await;
        assert_eq!(stats.sources_skipped, 1);
        assert!(outcome.failures.is_empty());
        assert_eq!(fetcher.calls("a"), 0);

        let mut config = test_config(2);
        config.health_check.skip_failed_sources = false;
        let orch = orchestrator(config, fetcher.clone(), CacheManager::disabled());
        let mut stats = RunStats::start();
        let outcome = orch.harvest(&[source("a"), source("b")], &mut stats).await;
        assert_eq!(stats.sources_failed, 1);
        assert_eq!(stats.fetch_attempts, 1);
        assert!(outcome.failures[0].error.contains("Probe failed"));
        assert_eq!(fetcher.calls("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out_and_fails() {
        let mut fetcher = scripted();
        fetcher.slow = Some("a".into());
        let fetcher = Arc::new(fetcher);
        let orch = orchestrator(test_config(2), fetcher.clone(), CacheManager::disabled());

        let mut stats = RunStats::start();
        let outcome = orch.harvest(&[source("a"), source("b")], &mut stats).await;

        assert_eq!(stats.sources_failed, 1);
        assert!(outcome.failures[0].error.contains("Timed out"));
        assert_eq!(fetcher.calls("a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_counts_unstarted_sources() {
        let fetcher = Arc::new(scripted());
        let cache = memory_cache();
        let orch = orchestrator(test_config(1), fetcher.clone(), cache.clone());
        orch.cancel_token().cancel();

        let mut stats = RunStats::start();
        let outcome = orch.harvest(&[source("a"), source("b")], &mut stats).await;

        assert!(outcome.cancelled);
        assert_eq!(stats.sources_cancelled, 2);
        assert_eq!(fetcher.calls("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_cleared_after_complete_run() {
        let fetcher = Arc::new(scripted());
        let cache = memory_cache();
        let orch = orchestrator(test_config(2), fetcher, cache.clone());

        orch.harvest(&[source("a")], &mut RunStats::start()).await;

        let checkpoints = CheckpointManager::new(cache);
        assert!(checkpoints.load::<RunCheckpoint>(HARVEST_CHECKPOINT).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_run_resumes_without_refetching() {
        let cache = memory_cache();
        let checkpoints = CheckpointManager::new(cache.clone());
        let sources = [source("a"), source("b"), source("c")];
        let registry = |fetcher: &Arc<ScriptedFetcher>| {
            FetcherRegistry::new().with(SourceClass::Web, Arc::clone(fetcher) as Arc<dyn SourceFetcher>)
        };

        let mut fetcher = scripted();
        fetcher
            .events
            .insert("c".into(), vec![RawEvent::titled("Late Show")]);
        let cancel = CancellationToken::new();
        fetcher.interrupt = Some(("b".into(), cancel.clone()));
        let fetcher = Arc::new(fetcher);

        // Interrupted while "b" is in flight; "b" finishes, "c" never starts
        let first = Orchestrator::new(
            Arc::new(test_config(1)),
            cache.clone(),
            registry(&fetcher),
            cancel,
        );
        let mut stats = RunStats::start();
        let outcome = first.harvest(&sources, &mut stats).await;

        assert!(outcome.cancelled);
        assert_eq!(stats.sources_scraped, 2);
        assert_eq!(stats.sources_cancelled, 1);
        assert_eq!(fetcher.calls("c"), 0);

        let saved: RunCheckpoint = checkpoints.load(HARVEST_CHECKPOINT).await.unwrap();
        assert_eq!(saved.completed, vec!["a", "b"]);

        let second = Orchestrator::new(
            Arc::new(test_config(1)),
            cache.clone(),
            registry(&fetcher),
            CancellationToken::new(),
        );
        let mut stats = RunStats::start();
        let outcome = second.harvest(&sources, &mut stats).await;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.events.len(), 4);
        assert_eq!(stats.sources_cached, 2);
        assert_eq!(stats.sources_scraped, 1);
        assert_eq!(fetcher.calls("a"), 1);
        assert_eq!(fetcher.calls("b"), 1);
        assert_eq!(fetcher.calls("c"), 1);
        assert!(checkpoints.load::<RunCheckpoint>(HARVEST_CHECKPOINT).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_all_reports_each_source_in_order() {
        let mut fetcher = scripted();
        fetcher.unreachable.push("b".into());
        let orch = orchestrator(test_config(2), Arc::new(fetcher), CacheManager::disabled());

        let results = orch.probe_all(&[source("a"), source("b")]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].reachable());
        assert!(!results[1].reachable());
        assert_eq!(results[1].source_id, "b");
    }

    #[tokio::test]
    async fn cleanup_closes_fetchers() {
        let fetcher = Arc::new(scripted());
        let orch = orchestrator(test_config(1), fetcher.clone(), memory_cache());
        orch.cleanup().await;
        assert_eq!(fetcher.closes.load(Ordering::SeqCst), 1);
    }
}
