//! Service layer for the harvester.
//!
//! This module contains the orchestration core:
//! - Result memoization (`CacheManager`) and run checkpoints (`CheckpointManager`)
//! - Bounded retries with backoff (`RetryPolicy`)
//! - Source fetch adapters (`SourceFetcher`, `WebFetcher`, `SocialPageFetcher`)
//! - Concurrent source scheduling (`Orchestrator`)

pub mod cache;
pub mod checkpoint;
pub mod extract;
mod fetch;
mod orchestrator;
mod retry;
mod web;

pub use cache::CacheManager;
pub use checkpoint::{CheckpointManager, RunCheckpoint};
pub use fetch::{FetcherRegistry, SourceFetcher};
pub use orchestrator::{HarvestOutcome, Orchestrator, ProbeResult, SourceOutcome};
pub use retry::RetryPolicy;
pub use web::{SocialPageFetcher, WebFetcher};
