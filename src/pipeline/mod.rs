//! Event pipeline and run entry points.
//!
//! - `EventPipeline`: normalize, validate and deduplicate raw events
//! - `run_harvest`: fetch every source, process, hand off to sinks
//! - `run_probe`: connectivity test only

pub mod dedup;
pub mod harvest;
pub mod normalize;
mod process;
pub mod validate;

pub use dedup::{Deduplicator, DuplicateMatch};
pub use harvest::{HarvestRun, default_fetchers, open_cache, run_harvest, run_probe};
pub use normalize::Normalizer;
pub use process::{EventPipeline, PipelineOutput};
pub use validate::Validator;
