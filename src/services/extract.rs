//! Structured-data extraction from event pages.
//!
//! Reads schema.org JSON-LD blocks and maps the `Event` family onto
//! [`RawEvent`]. Malformed blocks yield nothing.

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::models::RawEvent;
use crate::utils::resolve_url;

const EVENT_TYPES: [&str; 5] = [
    "Event",
    "SocialEvent",
    "MusicEvent",
    "TheaterEvent",
    "SportsEvent",
];

/// Extract every JSON-LD event on the page.
///
/// Relative URLs are resolved against `page_url`.
pub fn extract_events(html: &str, page_url: &str) -> Vec<RawEvent> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();

    let mut events = Vec::new();
    for (index, script) in document.select(&selector).enumerate() {
        let text: String = script.text().collect();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => collect_events(&value, base.as_ref(), &mut events),
            Err(e) => log::debug!("Skipping malformed JSON-LD block {} on {}: {}", index, page_url, e),
        }
    }
    events
}

fn collect_events(value: &Value, base: Option<&Url>, out: &mut Vec<RawEvent>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_events(item, base, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_events(graph, base, out);
            }
            if is_event(value) {
                match map_event(value, base) {
                    Some(event) => out.push(event),
                    None => log::debug!("Skipping JSON-LD event without a name"),
                }
            }
        }
        _ => {}
    }
}

fn is_event(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => EVENT_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| EVENT_TYPES.contains(&t)),
        _ => false,
    }
}

fn map_event(value: &Value, base: Option<&Url>) -> Option<RawEvent> {
    let title = text(value, "name")?;
    let location = value.get("location").map(first);
    let address = location.and_then(|l| l.get("address"));
    let organizer = value.get("organizer").map(first);
    let offers = value.get("offers").map(first);

    let link = |raw: Option<String>| match (raw, base) {
        (Some(href), Some(base)) => Some(resolve_url(base, &href)),
        (raw, _) => raw,
    };

    Some(RawEvent {
        title: Some(title),
        description: text(value, "description"),
        start_date: text(value, "startDate"),
        end_date: text(value, "endDate"),
        venue_name: location.and_then(|l| text(l, "name")),
        venue_address: address.and_then(|a| match a {
            Value::String(s) => Some(s.clone()),
            _ => text(a, "streetAddress"),
        }),
        venue_city: address.and_then(|a| text(a, "addressLocality")),
        venue_postal_code: address.and_then(|a| text(a, "postalCode")),
        venue_country: address.and_then(|a| match a.get("addressCountry") {
            Some(Value::Object(_)) => a.get("addressCountry").and_then(|c| text(c, "name")),
            _ => text(a, "addressCountry"),
        }),
        organizer_name: organizer.and_then(|o| text(o, "name")),
        organizer_email: organizer.and_then(|o| text(o, "email")),
        organizer_website: link(organizer.and_then(|o| text(o, "url"))),
        image_url: link(value.get("image").and_then(image_url)),
        event_url: link(text(value, "url")),
        booking_url: link(offers.and_then(|o| text(o, "url"))),
        price: offers.and_then(|o| match o.get("price") {
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => text(o, "price"),
        }),
        ..RawEvent::default()
    })
}

/// First element of an array, or the value itself.
fn first(value: &Value) -> &Value {
    match value {
        Value::Array(items) => items.first().unwrap_or(value),
        other => other,
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn image_url(image: &Value) -> Option<String> {
    match image {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.first().and_then(image_url),
        Value::Object(_) => text(image, "url"),
        _ => None,
    }
}
