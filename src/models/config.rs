//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Ten years.
const MAX_TTL_HOURS: u64 = 87_600;

/// One terabyte.
const MAX_CACHE_SIZE_MB: u64 = 1_048_576;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Result memoization and checkpoint storage
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry/backoff for source fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool settings
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Validation and deduplication rules
    #[serde(default)]
    pub data_quality: DataQualityConfig,

    /// Reachability probe before fetching
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Values filled into processed events when absent
    #[serde(default)]
    pub defaults: EventDefaults,

    /// Translation stage toggle
    #[serde(default)]
    pub translation: StageToggle,

    /// Image stage toggle
    #[serde(default)]
    pub images: StageToggle,

    /// Export location
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| AppError::config(format!("malformed {}: {}", path.display(), e)))
    }

    /// Number of concurrent source fetches for this run.
    pub fn worker_count(&self) -> usize {
        if self.performance.use_concurrency {
            self.performance.max_workers.max(1)
        } else {
            1
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.performance.max_workers == 0 {
            return Err(AppError::validation("performance.max_workers must be > 0"));
        }
        if self.performance.fetch_timeout_secs == 0 {
            return Err(AppError::validation(
                "performance.fetch_timeout_secs must be > 0",
            ));
        }
        if !(self.retry.backoff_factor >= 1.0 && self.retry.backoff_factor.is_finite()) {
            return Err(AppError::validation("retry.backoff_factor must be >= 1.0"));
        }
        if self.retry.initial_backoff_seconds < 0.0
            || self.retry.max_backoff_seconds < self.retry.initial_backoff_seconds
        {
            return Err(AppError::validation(
                "retry backoff bounds must satisfy 0 <= initial <= max",
            ));
        }
        if self.data_quality.min_title_length > self.data_quality.max_title_length {
            return Err(AppError::validation(
                "data_quality.min_title_length exceeds max_title_length",
            ));
        }
        let threshold = self.data_quality.threshold_percent();
        if !(0.0..=100.0).contains(&threshold) {
            return Err(AppError::validation(
                "data_quality.duplicate_threshold must be within [0, 100]",
            ));
        }
        if self.cache.max_size_mb == 0 {
            return Err(AppError::validation("cache.max_size_mb must be > 0"));
        }
        if self.cache.max_size_mb > MAX_CACHE_SIZE_MB {
            return Err(AppError::validation(format!(
                "cache.max_size_mb must be <= {MAX_CACHE_SIZE_MB}"
            )));
        }
        if self.cache.ttl_hours > MAX_TTL_HOURS {
            return Err(AppError::validation(format!(
                "cache.ttl_hours must be <= {MAX_TTL_HOURS}"
            )));
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-page request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay after each page request in milliseconds
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: 0,
        }
    }
}

/// Cache store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Lifetime of memoized results
    #[serde(default = "defaults::ttl_hours")]
    pub ttl_hours: u64,

    /// Total size bound before eviction
    #[serde(default = "defaults::max_size_mb")]
    pub max_size_mb: u64,

    /// Directory holding cache entries
    #[serde(default = "defaults::cache_dir")]
    pub dir: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: defaults::ttl_hours(),
            max_size_mb: defaults::max_size_mb(),
            dir: defaults::cache_dir(),
        }
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "defaults::initial_backoff")]
    pub initial_backoff_seconds: f64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            backoff_factor: defaults::backoff_factor(),
            initial_backoff_seconds: defaults::initial_backoff(),
            max_backoff_seconds: defaults::max_backoff(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum concurrent source fetches
    #[serde(default = "defaults::max_workers")]
    pub max_workers: usize,

    /// When false, sources are processed one at a time
    #[serde(default = "defaults::enabled")]
    pub use_concurrency: bool,

    /// Upper bound for a single fetch attempt in seconds
    #[serde(default = "defaults::fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::max_workers(),
            use_concurrency: true,
            fetch_timeout_secs: defaults::fetch_timeout(),
        }
    }
}

/// Validation and deduplication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityConfig {
    #[serde(default = "defaults::enabled")]
    pub remove_duplicates: bool,

    /// Fuzzy match threshold, as a percentage or a fraction
    #[serde(default = "defaults::duplicate_threshold")]
    pub duplicate_threshold: f64,

    #[serde(default = "defaults::min_title_length")]
    pub min_title_length: usize,

    #[serde(default = "defaults::max_title_length")]
    pub max_title_length: usize,

    #[serde(default = "defaults::enabled")]
    pub clean_html: bool,

    #[serde(default = "defaults::enabled")]
    pub validate_dates: bool,

    #[serde(default = "defaults::enabled")]
    pub validate_urls: bool,

    #[serde(default = "defaults::enabled")]
    pub validate_emails: bool,
}

impl DataQualityConfig {
    /// Threshold on the 0-100 similarity scale.
    ///
    /// Values up to 1.0 are read as fractions (`0.85` means 85).
    pub fn threshold_percent(&self) -> f64 {
        if self.duplicate_threshold <= 1.0 {
            self.duplicate_threshold * 100.0
        } else {
            self.duplicate_threshold
        }
    }
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            duplicate_threshold: defaults::duplicate_threshold(),
            min_title_length: defaults::min_title_length(),
            max_title_length: defaults::max_title_length(),
            clean_html: true,
            validate_dates: true,
            validate_urls: true,
            validate_emails: true,
        }
    }
}

/// Reachability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Skip unreachable sources silently instead of recording a failure
    #[serde(default = "defaults::enabled")]
    pub skip_failed_sources: bool,

    #[serde(default = "defaults::probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_failed_sources: true,
            timeout_secs: defaults::probe_timeout(),
        }
    }
}

/// Fill-in values for processed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDefaults {
    #[serde(default = "defaults::timezone")]
    pub timezone: String,

    #[serde(default = "defaults::country")]
    pub country: String,

    #[serde(default = "defaults::language")]
    pub language: String,

    #[serde(default = "defaults::status")]
    pub status: String,

    #[serde(default = "defaults::event_type")]
    pub event_type: String,
}

impl Default for EventDefaults {
    fn default() -> Self {
        Self {
            timezone: defaults::timezone(),
            country: defaults::country(),
            language: defaults::language(),
            status: defaults::status(),
            event_type: defaults::event_type(),
        }
    }
}

/// On/off switch for an optional downstream stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageToggle {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl Default for StageToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "defaults::output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
        }
    }
}

mod defaults {
    pub fn enabled() -> bool {
        true
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; harvester/0.1)".into()
    }
    pub fn timeout() -> u64 {
        15
    }

    // Cache defaults
    pub fn ttl_hours() -> u64 {
        24
    }
    pub fn max_size_mb() -> u64 {
        500
    }
    pub fn cache_dir() -> String {
        "data/cache".into()
    }

    // Retry defaults
    pub fn max_retries() -> u32 {
        3
    }
    pub fn backoff_factor() -> f64 {
        2.0
    }
    pub fn initial_backoff() -> f64 {
        2.0
    }
    pub fn max_backoff() -> f64 {
        60.0
    }

    // Performance defaults
    pub fn max_workers() -> usize {
        5
    }
    pub fn fetch_timeout() -> u64 {
        120
    }

    // Data quality defaults
    pub fn duplicate_threshold() -> f64 {
        85.0
    }
    pub fn min_title_length() -> usize {
        5
    }
    pub fn max_title_length() -> usize {
        200
    }

    pub fn probe_timeout() -> u64 {
        5
    }

    // Event defaults
    pub fn timezone() -> String {
        "Europe/Athens".into()
    }
    pub fn country() -> String {
        "Greece".into()
    }
    pub fn language() -> String {
        "el".into()
    }
    pub fn status() -> String {
        "publish".into()
    }
    pub fn event_type() -> String {
        "event".into()
    }

    pub fn output_dir() -> String {
        "data/output".into()
    }
}
