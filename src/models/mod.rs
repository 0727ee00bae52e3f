// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod source;
mod stats;

// Re-export all public types
pub use config::{
    CacheConfig, Config, CrawlerConfig, DataQualityConfig, EventDefaults, HealthCheckConfig,
    OutputConfig, PerformanceConfig, RetryConfig, StageToggle,
};
pub use event::{ProcessedEvent, RawEvent};
pub use source::{SourceCatalog, SourceClass, SourceDescriptor};
pub use stats::{FailedSource, Rejection, RunReport, RunStats};
