//! Exact and fuzzy duplicate removal.
//!
//! Exact phase: a hash over lowercased title, start instant and lowercased
//! venue, checked against the hashes of accepted events. Fuzzy phase: a
//! weighted similarity against every accepted event, first match wins.
//! The fuzzy phase is quadratic in the number of accepted events.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use strsim::normalized_levenshtein;

use crate::models::{DataQualityConfig, ProcessedEvent};

const TITLE_WEIGHT: f64 = 0.5;
const DATE_WEIGHT: f64 = 0.3;
const VENUE_WEIGHT: f64 = 0.2;

/// Venue score when either side has no venue.
const UNKNOWN_VENUE_SCORE: f64 = 50.0;

/// A dropped event and the accepted event it collapsed into.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub title: String,
    pub matched_title: String,
    /// Similarity on the 0-100 scale; 100 for exact matches
    pub score: f64,
    pub exact: bool,
}

fn key_text(value: Option<&str>) -> String {
    value.unwrap_or("").trim().to_lowercase()
}

fn start_key(event: &ProcessedEvent) -> String {
    event
        .start_date
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}

/// Hash used by the exact phase.
pub fn exact_hash(event: &ProcessedEvent) -> String {
    let input = [
        key_text(Some(&event.title)),
        start_key(event),
        key_text(event.venue_name.as_deref()),
    ]
    .join("|");
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Edit-distance ratio on the 0-100 scale.
fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

/// Weighted similarity of two events on the 0-100 scale.
pub fn similarity(a: &ProcessedEvent, b: &ProcessedEvent) -> f64 {
    let title = ratio(&key_text(Some(&a.title)), &key_text(Some(&b.title)));

    let date = if a.start_date == b.start_date {
        100.0
    } else {
        0.0
    };

    let venue_a = key_text(a.venue_name.as_deref());
    let venue_b = key_text(b.venue_name.as_deref());
    let venue = if venue_a.is_empty() || venue_b.is_empty() {
        UNKNOWN_VENUE_SCORE
    } else {
        ratio(&venue_a, &venue_b)
    };

    TITLE_WEIGHT * title + DATE_WEIGHT * date + VENUE_WEIGHT * venue
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    enabled: bool,
    /// Threshold on the 0-100 scale
    threshold: f64,
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }

    pub fn from_config(config: &DataQualityConfig) -> Self {
        Self {
            enabled: config.remove_duplicates,
            threshold: config.threshold_percent(),
        }
    }

    /// Keep the first representative of every duplicate group.
    ///
    /// Survivors are returned unchanged and in input order.
    pub fn deduplicate(
        &self,
        events: Vec<ProcessedEvent>,
    ) -> (Vec<ProcessedEvent>, Vec<DuplicateMatch>) {
        if !self.enabled {
            return (events, Vec::new());
        }

        let total = events.len();
        let mut unique: Vec<ProcessedEvent> = Vec::with_capacity(total);
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();

        for event in events {
            let hash = exact_hash(&event);
            if seen.contains(&hash) {
                log::debug!("Exact duplicate found: {}", event.title);
                let matched_title = unique
                    .iter()
                    .find(|u| exact_hash(u) == hash)
                    .map(|u| u.title.clone())
                    .unwrap_or_default();
                duplicates.push(DuplicateMatch {
                    title: event.title,
                    matched_title,
                    score: 100.0,
                    exact: true,
                });
                continue;
            }

            let fuzzy = unique
                .iter()
                .map(|u| (u, similarity(&event, u)))
                .find(|(_, score)| *score >= self.threshold);

            if let Some((matched, score)) = fuzzy {
                log::info!(
                    "Fuzzy duplicate found ({:.0}% similar): {} vs {}",
                    score,
                    event.title,
                    matched.title
                );
                duplicates.push(DuplicateMatch {
                    title: event.title,
                    matched_title: matched.title.clone(),
                    score,
                    exact: false,
                });
                continue;
            }

            seen.insert(hash);
            unique.push(event);
        }

        log::info!(
            "Removed {} duplicate events from {} total",
            duplicates.len(),
            total
        );
        (unique, duplicates)
    }
}
