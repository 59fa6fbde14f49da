//! Plain HTTP fetcher for static pages.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{markdown, request_error};
use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{validate_url, Fetcher};
use crate::types::document::RawDocument;

/// Fetches pages with a single GET and cleans HTML into markdown.
///
/// For JavaScript-heavy sites, use `RapidApiFetcher` or `FirecrawlFetcher`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            user_agent: "ListingScraper/0.1".to_string(),
        }
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<RawDocument> {
        validate_url(url)?;
        debug!(url = %url, "HTTP fetch starting");

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
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

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| request_error(url, e))?;

        let is_html = content_type.as_deref().map_or(true, |ct| ct.contains("html"));
        let (text, title) = if is_html {
            (markdown::html_to_markdown(&body), markdown::extract_title(&body))
        } else {
            (body.trim().to_string(), None)
        };

        if text.is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        let mut doc = RawDocument::new(url, text);
        if let Some(title) = title {
            doc = doc.with_title(title);
        }
        if let Some(ct) = content_type {
            doc = doc.with_content_type(ct);
        }
        Ok(doc)
    }

    fn name(&self) -> &str {
        "http"
    }
}
