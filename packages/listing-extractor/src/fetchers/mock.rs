//! Mock fetcher for testing.
//!
//! Provides a configurable mock implementation of the Fetcher trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::Fetcher;
use crate::types::document::RawDocument;

/// Mock fetcher for testing.
///
/// Serves canned pages by URL. Unknown URLs answer with status 404; URLs
/// registered with [`MockFetcher::with_failure`] answer with the given status.
///
/// # Example
///
/// ```rust
/// use listing_extractor::fetchers::MockFetcher;
///
/// let fetcher = MockFetcher::new()
///     .with_page("https://example.com/1", "# Listing one")
///     .with_failure("https://example.com/2", 503);
/// ```
#[derive(Default, Clone)]
pub struct MockFetcher {
    /// Canned page text indexed by URL
    pages: Arc<RwLock<HashMap<String, String>>>,
    /// Status codes for URLs that should fail
    failures: Arc<RwLock<HashMap<String, u16>>>,
    delay: Option<Duration>,
    /// Requested URLs, in call order
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    /// Create a new empty mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page that will be returned for `url`.
    pub fn add_page(&self, url: impl Into<String>, text: impl Into<String>) {
        self.pages.write().unwrap().insert(url.into(), text.into());
    }

    /// Add a page (builder pattern).
    pub fn with_page(self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.add_page(url, text);
        self
    }

    /// Make `url` fail with `status` (builder pattern).
    pub fn with_failure(self, url: impl Into<String>, status: u16) -> Self {
        self.failures.write().unwrap().insert(url.into(), status);
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of fetch calls.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Get the URLs that were requested.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Clear all recorded calls.
    pub fn reset_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<RawDocument> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.read().unwrap().get(url).copied();
        if let Some(status) = failure {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let text = self.pages.read().unwrap().get(url).cloned();
        match text {
            Some(text) => Ok(RawDocument::new(url, text).with_content_type("text/markdown")),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
