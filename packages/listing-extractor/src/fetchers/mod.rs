//! Fetcher implementations.
//!
//! - [`RapidApiFetcher`]: hosted scrape endpoints (GET or POST) returning rendered HTML
//! - [`FirecrawlFetcher`]: Firecrawl `/v1/scrape`, markdown out of the box
//! - [`HttpFetcher`]: plain GET for static pages
//! - [`MockFetcher`]: canned pages for tests

pub mod firecrawl;
pub mod http;
pub mod markdown;
pub mod mock;
pub mod rapidapi;

pub use firecrawl::FirecrawlFetcher;
pub use http::HttpFetcher;
pub use mock::MockFetcher;
pub use rapidapi::{RapidApiFetcher, ScrapeMode};

use crate::error::FetchError;

/// Map a reqwest failure for `url`, keeping timeouts distinct.
pub(crate) fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http(Box::new(err))
    }
}
