// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body as text, failing on non-success status codes.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::fetch(url, format!("HTTP {}", status)));
    }
    Ok(response.text().await?)
}

/// Lightweight reachability check: a HEAD request answered below 400.
pub async fn probe_url(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<()> {
    let response = client
        .head(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AppError::probe(url, e))?;

    let status = response.status();
    if status.as_u16() < 400 {
        Ok(())
    } else {
        Err(AppError::probe(url, format!("HTTP {}", status)))
    }
}
