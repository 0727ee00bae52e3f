// src/services/web.rs

//! HTTP fetchers for web pages and social pages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::models::{Config, RawEvent, SourceDescriptor};
use crate::services::extract::extract_events;
use crate::services::cache::url_key;
use crate::services::{CacheManager, SourceFetcher};
use crate::utils::http::{create_async_client, fetch_text, probe_url};

/// Fetches a page over HTTP and extracts its structured event data.
#[derive(Clone)]
pub struct WebFetcher {
    client: Client,
    cache: CacheManager,
    request_delay: Duration,
    probe_timeout: Duration,
}

impl WebFetcher {
    pub fn new(config: &Config, cache: CacheManager) -> Result<Self> {
        Ok(Self {
            client: create_async_client(&config.crawler)?,
            cache,
            request_delay: Duration::from_millis(config.crawler.request_delay_ms),
            probe_timeout: Duration::from_secs(config.health_check.timeout_secs),
        })
    }

    /// Page body, served from the `url:` cache when fresh.
    async fn page(&self, url: &str) -> Result<String> {
        self.cache
            .cached(&url_key(url), Some(self.cache.ttl()), || async {
                let body = fetch_text(&self.client, url).await?;
                if !self.request_delay.is_zero() {
                    tokio::time::sleep(self.request_delay).await;
                }
                Ok(body)
            })
            .await
    }

    pub async fn fetch_url(&self, source: &SourceDescriptor, url: &str) -> Result<Vec<RawEvent>> {
        if source.requires_interactive {
            log::debug!(
                "{} requests interactive fetching; using plain HTTP",
                source.name
            );
        }

        let body = self.page(url).await?;
        let events = extract_events(&body, url);
        log::debug!("Extracted {} events from {}", events.len(), url);
        Ok(events)
    }
}

#[async_trait]
impl SourceFetcher for WebFetcher {
    async fn probe(&self, source: &SourceDescriptor) -> Result<()> {
        probe_url(&self.client, &source.url, self.probe_timeout).await
    }

    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawEvent>> {
        self.fetch_url(source, &source.url).await
    }
}

/// Fetches a social page's event listing.
#[derive(Clone)]
pub struct SocialPageFetcher {
    inner: WebFetcher,
}

impl SocialPageFetcher {
    pub fn new(inner: WebFetcher) -> Self {
        Self { inner }
    }

    /// The page's `/events` listing address.
    pub fn events_url(page_url: &str) -> String {
        if page_url.contains("/events") {
            page_url.to_string()
        } else {
            format!("{}/events", page_url.trim_end_matches('/'))
        }
    }
}

/// Social pages are not probed before fetching.
#[async_trait]
impl SourceFetcher for SocialPageFetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawEvent>> {
        let url = Self::events_url(&source.url);
        self.inner.fetch_url(source, &url).await
    }
}
