//! Fetcher trait for retrieving page text.
//!
//! A fetcher turns one URL into a [`RawDocument`]. Any failure (transport,
//! non-success status, empty body) is reported as a [`FetchError`] and only
//! costs the batch that one URL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use listing_extractor::{Fetcher, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new();
//! let doc = fetcher.fetch("https://example.com/listings").await?;
//! println!("{} chars", doc.text.len());
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::FetchResult;
use crate::types::document::RawDocument;

/// Source of page text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a single URL.
    async fn fetch(&self, url: &str) -> FetchResult<RawDocument>;

    /// Get the fetcher name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> FetchResult<RawDocument> {
        (**self).fetch(url).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Reject anything that is not an absolute http(s) URL.
pub fn validate_url(url: &str) -> FetchResult<url::Url> {
    let parsed = url::Url::parse(url).map_err(|_| crate::error::FetchError::InvalidUrl {
        url: url.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(crate::error::FetchError::InvalidUrl {
            url: url.to_string(),
        }),
    }
}
