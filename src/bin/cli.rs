//! Event harvester CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use harvester::{
    error::Result,
    models::{Config, SourceCatalog},
    pipeline,
    services::CacheManager,
    storage::{CacheStore, DiskCache, EventSink, JsonExporter},
};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG: &str = "config/config.toml";

/// Event harvester - concurrent, cached, deduplicating event collection
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about = "Harvest event listings from many sources")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch all sources, process events and export them
    Run {
        /// Source catalog (TOML or JSON)
        #[arg(long)]
        sources: PathBuf,

        /// Override the number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// Disable the result cache
        #[arg(long)]
        no_cache: bool,

        /// Skip the image stage
        #[arg(long)]
        no_images: bool,

        /// Skip the translation stage
        #[arg(long)]
        no_translation: bool,

        /// Process at most this many sources
        #[arg(long)]
        limit: Option<usize>,

        /// Override the export directory
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Test connectivity to every source without fetching
    Probe {
        #[arg(long)]
        sources: PathBuf,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Validate configuration and source catalog
    Validate {
        #[arg(long)]
        sources: Option<PathBuf>,
    },

    /// Inspect or maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show entry count and size
    Stats,
    /// Remove expired entries
    Purge,
    /// Remove every entry, checkpoints included
    Clear,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load the config file; built-in defaults only when the default path is absent.
fn load_config(path: &Path) -> Result<Config> {
    let config = if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        log::warn!("No config at {}; using defaults", path.display());
        Config::default()
    } else {
        let config = Config::load(path)?;
        log::info!("Loaded configuration from {}", path.display());
        config
    };
    config.validate()?;
    Ok(config)
}

fn load_catalog(path: &Path) -> Result<SourceCatalog> {
    let catalog = SourceCatalog::load(path)?;
    log::info!(
        "Loaded {} sources ({} active) from {}",
        catalog.len(),
        catalog.active(None).len(),
        path.display()
    );
    Ok(catalog)
}

/// Cancel the token on Ctrl-C.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; finishing in-flight sources");
            cancel.cancel();
        }
    });
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli.config)?;

    match cli.command {
        Command::Run {
            sources,
            workers,
            no_cache,
            no_images,
            no_translation,
            limit,
            output,
        } => {
            if let Some(workers) = workers {
                config.performance.max_workers = workers.max(1);
            }
            if no_cache {
                config.cache.enabled = false;
            }
            if no_images {
                config.images.enabled = false;
            }
            if no_translation {
                config.translation.enabled = false;
            }
            if let Some(output) = output {
                config.output.dir = output.to_string_lossy().into_owned();
            }

            let catalog = load_catalog(&sources)?;
            let config = Arc::new(config);
            let cache = pipeline::open_cache(&config).await;
            let fetchers = pipeline::default_fetchers(&config, cache.clone())?;
            let sinks: Vec<Arc<dyn EventSink>> =
                vec![Arc::new(JsonExporter::new(&config.output.dir))];

            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let run = pipeline::run_harvest(
                Arc::clone(&config),
                &catalog,
                limit,
                cache,
                fetchers,
                &sinks,
                cancel,
            )
            .await?;

            log::info!("Harvest complete: {} events", run.events.len());
        }

        Command::Probe { sources, limit } => {
            let catalog = load_catalog(&sources)?;
            let config = Arc::new(config);
            let fetchers = pipeline::default_fetchers(&config, CacheManager::disabled())?;

            let results = pipeline::run_probe(config, &catalog, limit, fetchers).await?;
            let reachable = results.iter().filter(|r| r.reachable()).count();
            log::info!("{}/{} sources reachable", reachable, results.len());
        }

        Command::Validate { sources } => {
            log::info!("Configuration OK ({} workers)", config.worker_count());
            if let Some(path) = sources {
                let catalog = load_catalog(&path)?;
                log::info!("Source catalog OK ({} sources)", catalog.len());
            }
        }

        Command::Cache { action } => {
            let store = DiskCache::open(&config.cache.dir, config.cache.max_size_bytes()).await?;
            match action {
                CacheAction::Stats => {
                    let stats = store.stats().await?;
                    println!("Cache directory: {}", store.root_dir().display());
                    println!("Entries: {}", stats.entries);
                    println!("Size: {:.2} MB", stats.bytes as f64 / (1024.0 * 1024.0));
                    println!("TTL: {} hours", config.cache.ttl_hours);
                }
                CacheAction::Purge => {
                    let removed = store.purge_expired().await?;
                    log::info!("Removed {} expired entries", removed);
                }
                CacheAction::Clear => {
                    store.clear().await?;
                    log::info!("Cache cleared");
                }
            }
        }
    }

    Ok(())
}

