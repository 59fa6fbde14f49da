//! Firecrawl scrape fetcher.
//!
//! Uses the Firecrawl API for JavaScript-heavy sites with anti-bot
//! protection. Firecrawl returns markdown directly.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::request_error;
use crate::backends::ApiKey;
use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{validate_url, Fetcher};
use crate::types::document::RawDocument;

const FIRECRAWL_API_URL: &str = "https://api.firecrawl.dev/v1";

/// Firecrawl-based fetcher.
#[derive(Clone)]
pub struct FirecrawlFetcher {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    only_main_content: bool,
}

// Request/Response types for Firecrawl API

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    only_main_content: bool,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
    metadata: Option<PageMetadata>,
}

#[derive(Deserialize)]
struct PageMetadata {
    title: Option<String>,
}

impl FirecrawlFetcher {
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: FIRECRAWL_API_URL.to_string(),
            only_main_content: true,
        }
    }

    /// Keep headers, footers and sidebars in the returned markdown.
    pub fn with_full_page(mut self) -> Self {
        self.only_main_content = false;
        self
    }

    /// Set a custom base URL (self-hosted Firecrawl).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

fn scrape_failed(message: impl Into<String>) -> FetchError {
    FetchError::Http(Box::new(std::io::Error::new(
        std::io::ErrorKind::Other,
        message.into(),
    )))
}

#[async_trait]
impl Fetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<RawDocument> {
        validate_url(url)?;

        let request = ScrapeRequest {
            url,
            formats: ["markdown"],
            only_main_content: self.only_main_content,
        };

        let response = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let response: ScrapeResponse = response.json().await.map_err(|e| request_error(url, e))?;
        if !response.success {
            return Err(scrape_failed(format!(
                "Firecrawl scrape failed: {}",
                response.error.unwrap_or_default()
            )));
        }

        let data = response
            .data
            .ok_or_else(|| scrape_failed("No data returned from Firecrawl"))?;
        let markdown = data
            .markdown
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| FetchError::Empty {
                url: url.to_string(),
            })?;

        let mut doc = RawDocument::new(url, markdown).with_content_type("text/markdown");
        if let Some(title) = data.metadata.and_then(|m| m.title) {
            doc = doc.with_title(title);
        }
        Ok(doc)
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}
