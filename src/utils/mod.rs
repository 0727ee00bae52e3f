//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Whether the string is an absolute http(s) URL.
pub fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://venue.example/events/").unwrap();
        assert_eq!(
            resolve_url(&base, "jazz.html"),
            "https://venue.example/events/jazz.html"
        );
        assert_eq!(
            resolve_url(&base, "/img/poster.jpg"),
            "https://venue.example/img/poster.jpg"
        );
        assert_eq!(
            resolve_url(&base, "https://tickets.example/x"),
            "https://tickets.example/x"
        );
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://venue.example/e/1"));
        assert!(is_http_url("http://venue.example"));
        assert!(!is_http_url("ftp://venue.example/file"));
        assert!(!is_http_url("mailto:info@venue.example"));
        assert!(!is_http_url("/relative/path"));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Summer \n\t Jazz   "), "Summer Jazz");
        assert_eq!(normalize_whitespace(""), "");
    }
}
