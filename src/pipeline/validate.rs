//! Event validation rules.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::{DataQualityConfig, ProcessedEvent};

/// Checks required fields and title length bounds.
#[derive(Debug, Clone)]
pub struct Validator {
    min_title_length: usize,
    max_title_length: usize,
}

impl Validator {
    pub fn new(min_title_length: usize, max_title_length: usize) -> Self {
        Self {
            min_title_length,
            max_title_length,
        }
    }

    pub fn from_config(config: &DataQualityConfig) -> Self {
        Self::new(config.min_title_length, config.max_title_length)
    }

    /// Every reason the event is invalid; empty when it passes.
    pub fn check(&self, event: &ProcessedEvent) -> Vec<String> {
        let mut reasons = Vec::new();

        if event.title.trim().is_empty() {
            reasons.push("Missing required field: title".to_string());
        }
        if event.start_date.is_none() {
            reasons.push("Missing required field: start_date".to_string());
        }

        if !event.title.is_empty() {
            let length = event.title.graphemes(true).count();
            if length < self.min_title_length {
                reasons.push(format!(
                    "Title too short (min {} chars)",
                    self.min_title_length
                ));
            }
            if length > self.max_title_length {
                reasons.push(format!(
                    "Title too long (max {} chars)",
                    self.max_title_length
                ));
            }
        }

        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDefaults, RawEvent};
    use crate::pipeline::normalize::Normalizer;

    fn event(title: &str, start: Option<&str>) -> ProcessedEvent {
        let raw = RawEvent {
            title: Some(title.to_string()),
            start_date: start.map(String::from),
            ..RawEvent::default()
        };
        Normalizer::new(DataQualityConfig::default(), EventDefaults::default()).normalize(raw)
    }

    fn validator() -> Validator {
        Validator::new(5, 200)
    }

    #[test]
    fn complete_event_passes() {
        assert!(validator().check(&event("Summer Jazz Festival", Some("2025-07-12"))).is_empty());
    }

    #[test]
    fn empty_title_names_missing_field() {
        let reasons = validator().check(&event("", Some("2025-07-12")));
        assert_eq!(reasons, vec!["Missing required field: title"]);
    }

    #[test]
    fn short_title_rejected() {
        let reasons = validator().check(&event("Gig", Some("2025-07-12")));
        assert_eq!(reasons, vec!["Title too short (min 5 chars)"]);
    }

    #[test]
    fn long_title_rejected() {
        let reasons = Validator::new(5, 10).check(&event("A very long title", Some("2025-07-12")));
        assert_eq!(reasons, vec!["Title too long (max 10 chars)"]);
    }

    #[test]
    fn missing_and_unparsable_start_share_reason() {
        let expected = vec!["Missing required field: start_date".to_string()];
        assert_eq!(validator().check(&event("Harbour Concert", None)), expected);
        assert_eq!(validator().check(&event("Harbour Concert", Some("soon"))), expected);
    }

    #[test]
    fn all_reasons_reported() {
        let reasons = validator().check(&event("", None));
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn length_counts_graphemes() {
        // Five user-perceived characters, more bytes and code points
        let title = "e\u{301}e\u{301}e\u{301}e\u{301}e\u{301}";
        assert!(validator().check(&event(title, Some("2025-07-12"))).is_empty());
    }
}
