// src/pipeline/harvest.rs

//! Harvest run entry points.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, ProcessedEvent, RunReport, RunStats, SourceCatalog, SourceClass};
use crate::pipeline::EventPipeline;
use crate::services::{
    CacheManager, FetcherRegistry, Orchestrator, ProbeResult, SocialPageFetcher, WebFetcher,
};
use crate::storage::{DiskCache, EventSink, SinkStage};

/// Open the configured cache, degrading to a disabled cache on failure.
pub async fn open_cache(config: &Config) -> CacheManager {
    if !config.cache.enabled {
        return CacheManager::disabled();
    }
    match DiskCache::open(&config.cache.dir, config.cache.max_size_bytes()).await {
        Ok(store) => CacheManager::from_config(Some(Arc::new(store)), &config.cache),
        Err(e) => {
            log::error!("Cannot open cache at {}: {}; continuing without cache", config.cache.dir, e);
            CacheManager::disabled()
        }
    }
}

/// Default HTTP fetchers for every source class.
pub fn default_fetchers(config: &Config, cache: CacheManager) -> Result<FetcherRegistry> {
    let web = WebFetcher::new(config, cache)?;
    let social = SocialPageFetcher::new(web.clone());
    Ok(FetcherRegistry::new()
        .with(SourceClass::Web, Arc::new(web))
        .with(SourceClass::SocialPage, Arc::new(social)))
}

fn stage_enabled(config: &Config, stage: SinkStage) -> bool {
    match stage {
        SinkStage::Translation => config.translation.enabled,
        SinkStage::Images => config.images.enabled,
        SinkStage::Export => true,
    }
}

/// Hand the final set to each enabled sink: translation, images, export.
async fn deliver(
    config: &Config,
    sinks: &[Arc<dyn EventSink>],
    events: &[ProcessedEvent],
    report: &mut RunReport,
) {
    let order = [SinkStage::Translation, SinkStage::Images, SinkStage::Export];
    for stage in order {
        for sink in sinks.iter().filter(|s| s.stage() == stage) {
            if !stage_enabled(config, stage) {
                log::info!("Skipping {} ({:?} stage disabled)", sink.name(), stage);
                continue;
            }

            match sink.accept(events).await {
                Ok(count) => {
                    log::info!("{} accepted {} events", sink.name(), count);
                    if stage == SinkStage::Export {
                        report.stats.events_exported += count;
                    }
                }
                Err(e) => {
                    log::error!("{} failed: {}", sink.name(), e);
                    report.sink_errors.push(format!("{}: {}", sink.name(), e));
                }
            }
        }
    }
}

/// Outcome of [`run_harvest`].
#[derive(Debug, Default)]
pub struct HarvestRun {
    pub report: RunReport,
    /// Unique valid events, as handed to the sinks
    pub events: Vec<ProcessedEvent>,
}

/// Run a full harvest: fetch, process, deliver.
///
/// Cleanup runs on every exit path. Per-source and per-sink failures are
/// recorded in the report, never returned.
pub async fn run_harvest(
    config: Arc<Config>,
    catalog: &SourceCatalog,
    limit: Option<usize>,
    cache: CacheManager,
    fetchers: FetcherRegistry,
    sinks: &[Arc<dyn EventSink>],
    cancel: CancellationToken,
) -> Result<HarvestRun> {
    let orchestrator = Orchestrator::new(Arc::clone(&config), cache, fetchers, cancel);
    let result = harvest(&config, catalog, limit, &orchestrator, sinks).await;
    orchestrator.cleanup().await;
    result
}

async fn harvest(
    config: &Config,
    catalog: &SourceCatalog,
    limit: Option<usize>,
    orchestrator: &Orchestrator,
    sinks: &[Arc<dyn EventSink>],
) -> Result<HarvestRun> {
    let sources = catalog.active(limit);
    if sources.is_empty() {
        log::warn!("No active sources to harvest");
    }

    let mut stats = RunStats::start();
    let outcome = orchestrator.harvest(&sources, &mut stats).await;

    let pipeline = EventPipeline::from_config(config);
    let output = pipeline.process(outcome.events, &mut stats);

    let mut report = RunReport {
        failures: outcome.failures,
        rejections: output.rejections,
        cancelled: outcome.cancelled,
        ..RunReport::default()
    };

    if output.events.is_empty() {
        log::warn!("No events to deliver");
    } else {
        deliver(config, sinks, &output.events, &mut report).await;
    }

    stats.finish();
    report.stats = stats;
    report.log_summary();

    Ok(HarvestRun {
        report,
        events: output.events,
    })
}

/// Probe every active source without fetching.
pub async fn run_probe(
    config: Arc<Config>,
    catalog: &SourceCatalog,
    limit: Option<usize>,
    fetchers: FetcherRegistry,
) -> Result<Vec<ProbeResult>> {
    let sources = catalog.active(limit);
    log::info!("Testing connectivity for {} sources", sources.len());

    let orchestrator = Orchestrator::new(
        config,
        CacheManager::disabled(),
        fetchers,
        CancellationToken::new(),
    );
    let result = orchestrator.probe_all(&sources).await;
    orchestrator.cleanup().await;

    let results = result?;
    for probe in &results {
        match &probe.error {
            None => log::info!("✓ {}: reachable", probe.source_name),
            Some(e) => log::warn!("✗ {}: {}", probe.source_name, e),
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawEvent, SourceDescriptor};
    use crate::services::SourceFetcher;
    use crate::storage::{JsonExporter, MemoryCache};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedFetcher {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for FixedFetcher {
        async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawEvent>> {
            let title = match source.id.as_str() {
                "a" => "Harbour Jazz Night",
                "b" => "Open Air Cinema",
                _ => "Folk Dance Festival",
            };
            let mut event = RawEvent::titled(title);
            event.start_date = Some("2025-09-01 20:00".into());
            Ok(vec![event])
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sink that records what it saw, optionally failing.
    struct RecordingSink {
        stage: SinkStage,
        fail: bool,
        seen: Mutex<usize>,
    }

    impl RecordingSink {
        fn new(stage: SinkStage, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                stage,
                fail,
                seen: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn stage(&self) -> SinkStage {
            self.stage
        }

        async fn accept(&self, events: &[ProcessedEvent]) -> Result<usize> {
            *self.seen.lock().unwrap() += events.len();
            if self.fail {
                return Err(crate::error::AppError::validation("translator offline"));
            }
            Ok(events.len())
        }
    }

    fn catalog() -> SourceCatalog {
        let source = |id: &str| SourceDescriptor {
            id: id.into(),
            name: format!("Venue {id}"),
            url: format!("https://{id}.example/"),
            class: SourceClass::Web,
            requires_interactive: false,
            active: true,
        };
        SourceCatalog::new(vec![source("a"), source("b"), source("c")])
    }

    fn registry(fetcher: Arc<FixedFetcher>) -> FetcherRegistry {
        FetcherRegistry::new().with(SourceClass::Web, fetcher)
    }

    #[tokio::test]
    async fn harvest_exports_and_cleans_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(FixedFetcher {
            closes: AtomicUsize::new(0),
        });
        let exporter: Arc<dyn EventSink> = Arc::new(JsonExporter::new(tmp.path()));
        let cache = CacheManager::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));

        let run = run_harvest(
            Arc::new(Config::default()),
            &catalog(),
            Some(2),
            cache,
            registry(fetcher.clone()),
            &[exporter],
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.events.len(), 2);
        assert_eq!(run.report.stats.sources_total, 2);
        assert_eq!(run.report.stats.events_exported, 2);
        assert!(run.report.stats.finished_at.is_some());
        assert_eq!(fetcher.closes.load(Ordering::SeqCst), 1);

        let latest = JsonExporter::new(tmp.path()).load_latest().await.unwrap().unwrap();
        assert_eq!(latest.count, 2);
    }

    #[tokio::test]
    async fn disabled_stages_are_skipped_and_failures_recorded() {
        let mut config = Config::default();
        config.images.enabled = false;

        let translation = RecordingSink::new(SinkStage::Translation, true);
        let images = RecordingSink::new(SinkStage::Images, false);
        let export = RecordingSink::new(SinkStage::Export, false);
        let sinks: Vec<Arc<dyn EventSink>> = vec![export.clone(), images.clone(), translation.clone()];

        let run = run_harvest(
            Arc::new(config),
            &catalog(),
            None,
            CacheManager::disabled(),
            registry(Arc::new(FixedFetcher {
                closes: AtomicUsize::new(0),
            })),
            &sinks,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*translation.seen.lock().unwrap(), 3);
        assert_eq!(*images.seen.lock().unwrap(), 0);
        assert_eq!(*export.seen.lock().unwrap(), 3);
        assert_eq!(run.report.sink_errors.len(), 1);
        assert_eq!(run.report.stats.events_exported, 3);
    }

    #[tokio::test]
    async fn probe_reports_without_fetching() {
        let results = run_probe(
            Arc::new(Config::default()),
            &catalog(),
            None,
            registry(Arc::new(FixedFetcher {
                closes: AtomicUsize::new(0),
            })),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(ProbeResult::reachable));
    }
}
