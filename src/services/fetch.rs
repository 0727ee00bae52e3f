//! The "fetch a source, return raw events" contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{RawEvent, SourceClass, SourceDescriptor};

/// One fetch strategy per source class.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Cheap reachability check run before fetching.
    async fn probe(&self, _source: &SourceDescriptor) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawEvent>>;

    /// Release held sessions. Called once during cleanup.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Maps each source class to its fetcher.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<SourceClass, Arc<dyn SourceFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: SourceClass, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.register(class, fetcher);
        self
    }

    pub fn register(&mut self, class: SourceClass, fetcher: Arc<dyn SourceFetcher>) {
        self.fetchers.insert(class, fetcher);
    }

    pub fn get(&self, class: SourceClass) -> Result<Arc<dyn SourceFetcher>> {
        self.fetchers
            .get(&class)
            .cloned()
            .ok_or_else(|| AppError::config(format!("no fetcher registered for {class}")))
    }

    /// Close every distinct fetcher; failures are logged, not returned.
    pub async fn close_all(&self) {
        let mut closed: Vec<&Arc<dyn SourceFetcher>> = Vec::new();
        for (class, fetcher) in &self.fetchers {
            if closed.iter().any(|seen| Arc::ptr_eq(seen, fetcher)) {
                continue;
            }
            closed.push(fetcher);

            if let Err(e) = fetcher.close().await {
                log::warn!("Error closing {} fetcher: {}", class, e);
            }
        }
    }
}
