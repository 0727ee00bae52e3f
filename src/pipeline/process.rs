//! Normalize → validate → deduplicate.

use crate::models::{Config, ProcessedEvent, RawEvent, Rejection, RunStats};
use crate::pipeline::dedup::{Deduplicator, DuplicateMatch};
use crate::pipeline::normalize::Normalizer;
use crate::pipeline::validate::Validator;

/// What the pipeline hands back.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// Unique valid events in input order
    pub events: Vec<ProcessedEvent>,
    pub rejections: Vec<Rejection>,
    pub duplicates: Vec<DuplicateMatch>,
}

#[derive(Debug, Clone)]
pub struct EventPipeline {
    normalizer: Normalizer,
    validator: Validator,
    deduplicator: Deduplicator,
}

impl EventPipeline {
    pub fn new(normalizer: Normalizer, validator: Validator, deduplicator: Deduplicator) -> Self {
        Self {
            normalizer,
            validator,
            deduplicator,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Normalizer::new(config.data_quality.clone(), config.defaults.clone()),
            Validator::from_config(&config.data_quality),
            Deduplicator::from_config(&config.data_quality),
        )
    }

    /// Reduce raw events to the unique valid set, updating `stats`.
    pub fn process(&self, raw: Vec<RawEvent>, stats: &mut RunStats) -> PipelineOutput {
        let total = raw.len();
        log::info!("Processing {} events...", total);

        let mut valid = Vec::with_capacity(total);
        let mut rejections = Vec::new();

        for event in raw {
            let processed = self.normalizer.normalize(event);
            let reasons = self.validator.check(&processed);
            if reasons.is_empty() {
                valid.push(processed);
                continue;
            }

            let title = if processed.title.is_empty() {
                "Unknown".to_string()
            } else {
                processed.title
            };
            log::warn!(
                "Event failed validation: {} - Errors: {}",
                title,
                reasons.join(", ")
            );
            rejections.push(Rejection {
                title,
                source_id: processed.source_id,
                reasons,
            });
        }

        log::info!("Filtered {} events to {} valid events", total, valid.len());
        stats.events_valid += valid.len();
        stats.events_invalid += rejections.len();

        let (events, duplicates) = self.deduplicator.deduplicate(valid);
        stats.events_duplicate += duplicates.len();

        PipelineOutput {
            events,
            rejections,
            duplicates,
        }
    }
}
