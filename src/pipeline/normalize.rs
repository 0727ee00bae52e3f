//! Raw event normalization.
//!
//! Turns loosely-typed [`RawEvent`]s into [`ProcessedEvent`]s: markup
//! stripped, dates parsed to UTC instants, links and emails checked,
//! identifier and slug derived, defaults filled.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::Html;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::models::{DataQualityConfig, EventDefaults, ProcessedEvent, RawEvent};
use crate::utils::{is_http_url, normalize_whitespace};

const MAX_SLUG_CHARS: usize = 100;

static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").ok()
});

/// Timestamp layouts carrying an explicit offset.
const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
];

/// Naive timestamp layouts, read as UTC.
const DATETIME_FORMATS: [&str; 12] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M",
    "%d %B %Y %H:%M",
    "%d %b %Y %H:%M",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %H:%M",
];

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Parse a free-form timestamp into a UTC instant.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn html_to_text(value: &str) -> String {
    let fragment = Html::parse_fragment(value);
    let text: String = fragment.root_element().text().collect();
    normalize_whitespace(&text)
}

/// URL-friendly slug from Unicode words, at most 100 characters.
pub fn slugify(title: &str) -> String {
    let joined = title
        .unicode_words()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");

    let truncated: String = joined.chars().take(MAX_SLUG_CHARS).collect();
    truncated.trim_end_matches('-').to_string()
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}

/// Deterministic id over title, start, venue name and source address.
pub fn event_id(
    title: &str,
    start: Option<&DateTime<Utc>>,
    venue: Option<&str>,
    source_url: Option<&str>,
) -> String {
    let start = start.map(DateTime::to_rfc3339).unwrap_or_default();
    let input = [title, start.as_str(), venue.unwrap_or(""), source_url.unwrap_or("")].join("|");
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    format!("evt_{}", &digest[..12])
}

/// Trimmed value, absent when empty.
fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    quality: DataQualityConfig,
    defaults: EventDefaults,
}

impl Normalizer {
    pub fn new(quality: DataQualityConfig, defaults: EventDefaults) -> Self {
        Self { quality, defaults }
    }

    fn markup(&self, value: Option<String>) -> Option<String> {
        let value = text(value)?;
        let cleaned = if self.quality.clean_html {
            html_to_text(&value)
        } else {
            value
        };
        Some(cleaned).filter(|v| !v.is_empty())
    }

    fn date(&self, field: &str, value: Option<String>) -> Option<DateTime<Utc>> {
        let value = text(value)?;
        let parsed = parse_datetime(&value);
        if parsed.is_none() {
            log::warn!("Invalid date in {}: {}", field, value);
        }
        parsed
    }

    fn link(&self, field: &str, value: Option<String>) -> Option<String> {
        let value = text(value)?;
        if self.quality.validate_urls && !is_http_url(&value) {
            log::warn!("Invalid URL in {}: {}", field, value);
            return None;
        }
        Some(value)
    }

    fn email(&self, value: Option<String>) -> Option<String> {
        let value = text(value)?;
        if self.quality.validate_emails && !is_valid_email(&value) {
            log::warn!("Invalid email: {}", value);
            return None;
        }
        Some(value)
    }

    pub fn normalize(&self, raw: RawEvent) -> ProcessedEvent {
        let title = self.markup(raw.title).unwrap_or_default();

        let mut start_date = self.date("start_date", raw.start_date);
        let mut end_date = self.date("end_date", raw.end_date);
        if self.quality.validate_dates {
            if let (Some(start), Some(end)) = (start_date, end_date) {
                if end < start {
                    log::warn!("End date before start date, swapping: {}", title);
                    std::mem::swap(&mut start_date, &mut end_date);
                }
            }
        }

        let venue_name = self.markup(raw.venue_name);
        let source_url = self.link("source_url", raw.source_url);
        let event_id = event_id(
            &title,
            start_date.as_ref(),
            venue_name.as_deref(),
            source_url.as_deref(),
        );

        ProcessedEvent {
            event_id,
            slug: slugify(&title),
            subtitle: self.markup(raw.subtitle),
            description: self.markup(raw.description),
            excerpt: self.markup(raw.excerpt),
            start_date,
            end_date,
            all_day: raw.all_day.unwrap_or(false),
            timezone: text(raw.timezone).unwrap_or_else(|| self.defaults.timezone.clone()),
            venue_name,
            venue_address: text(raw.venue_address),
            venue_city: text(raw.venue_city),
            venue_postal_code: text(raw.venue_postal_code),
            venue_country: text(raw.venue_country)
                .unwrap_or_else(|| self.defaults.country.clone()),
            organizer_name: self.markup(raw.organizer_name),
            organizer_email: self.email(raw.organizer_email),
            organizer_website: self.link("organizer_website", raw.organizer_website),
            image_url: self.link("image_url", raw.image_url),
            event_url: self.link("event_url", raw.event_url),
            booking_url: self.link("booking_url", raw.booking_url),
            price: text(raw.price),
            tags: raw
                .tags
                .into_iter()
                .filter_map(|t| text(Some(t)))
                .collect(),
            language: self.defaults.language.clone(),
            status: self.defaults.status.clone(),
            event_type: self.defaults.event_type.clone(),
            featured: false,
            source_id: raw.source_id,
            source_name: raw.source_name,
            source_url,
            scraped_at: raw.fetched_at,
            extra: raw.extra,
            title,
        }
    }
}
