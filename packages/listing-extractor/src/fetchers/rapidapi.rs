//! RapidAPI scrape endpoints.
//!
//! Two hosted scrapers are supported: a `GET /scrape?url=` endpoint that
//! returns the rendered HTML, and a `POST /api/scrape` endpoint taking a JSON
//! body with a `waitUntil` load condition. Either way the HTML is cleaned
//! into markdown before extraction.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

use super::{markdown, request_error};
use crate::backends::ApiKey;
use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{validate_url, Fetcher};
use crate::types::document::RawDocument;

const DEFAULT_HOST: &str = "fast-ninja-scraper.p.rapidapi.com";
const POST_HOST: &str = "cheap-web-scarping-api.p.rapidapi.com";
const DEFAULT_WAIT_UNTIL: &str = "domcontentloaded";

/// Response fields that may carry the page HTML in a JSON reply.
const HTML_FIELDS: [&str; 5] = ["html", "content", "data", "body", "text"];

/// How the scrape endpoint is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeMode {
    /// `GET /scrape?url=<url>`
    Get,
    /// `POST /api/scrape` with `{"url", "waitUntil"}`
    Post { wait_until: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeBody<'a> {
    url: &'a str,
    wait_until: &'a str,
}

/// Fetcher backed by a RapidAPI scraping service.
///
/// # Example
///
/// ```rust,ignore
/// let fetcher = RapidApiFetcher::new(ApiKey::new(std::env::var("RAPIDAPI_KEY")?));
/// let doc = fetcher.fetch("https://example.com/listings").await?;
/// ```
#[derive(Clone)]
pub struct RapidApiFetcher {
    client: Client,
    api_key: ApiKey,
    host: String,
    base_url: String,
    mode: ScrapeMode,
}

impl RapidApiFetcher {
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            base_url: format!("https://{}", DEFAULT_HOST),
            mode: ScrapeMode::Get,
        }
    }

    /// The `POST /api/scrape` scraper, waiting for `domcontentloaded`.
    pub fn post_api(api_key: impl Into<ApiKey>) -> Self {
        Self::new(api_key).with_host(POST_HOST).with_mode(ScrapeMode::Post {
            wait_until: DEFAULT_WAIT_UNTIL.to_string(),
        })
    }

    pub fn with_mode(mut self, mode: ScrapeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Load condition for the POST endpoint. Switches to POST mode.
    pub fn with_wait_until(self, wait_until: impl Into<String>) -> Self {
        self.with_mode(ScrapeMode::Post {
            wait_until: wait_until.into(),
        })
    }

    pub fn mode(&self) -> &ScrapeMode {
        &self.mode
    }

    /// JSON body sent in POST mode.
    fn request_body(&self, url: &str) -> Option<Value> {
        match &self.mode {
            ScrapeMode::Get => None,
            ScrapeMode::Post { wait_until } => serde_json::to_value(ScrapeBody {
                url,
                wait_until,
            })
            .ok(),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = match self.request_body(url) {
            Some(body) => self
                .client
                .post(format!("{}/api/scrape", self.base_url))
                .json(&body),
            None => self
                .client
                .get(format!("{}/scrape", self.base_url))
                .query(&[("url", url)]),
        };
        builder
            .header("x-rapidapi-key", self.api_key.expose())
            .header("x-rapidapi-host", &self.host)
    }

    /// Use a different RapidAPI host (sent as `x-rapidapi-host`).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self.base_url = format!("https://{}", self.host);
        self
    }

    /// Send requests somewhere other than `https://<host>`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl Fetcher for RapidApiFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<RawDocument> {
        validate_url(url)?;
        debug!(url = %url, host = %self.host, mode = ?self.mode, "RapidAPI scrape starting");

        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "RapidAPI request failed");
                request_error(url, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| request_error(url, e))?;
        let html = html_from_body(&body);
        let text = markdown::html_to_markdown(&html);
        if text.is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        let mut doc = RawDocument::new(url, text).with_content_type("text/markdown");
        if let Some(title) = markdown::extract_title(&html) {
            doc = doc.with_title(title);
        }
        Ok(doc)
    }

    fn name(&self) -> &str {
        "rapidapi"
    }
}

/// Page HTML from a scrape response: a JSON object's HTML field when the
/// endpoint wraps it, the body itself otherwise.
fn html_from_body(body: &str) -> Cow<'_, str> {
    if !body.trim_start().starts_with('{') {
        return Cow::Borrowed(body);
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut map)) => HTML_FIELDS
            .iter()
            .find_map(|field| match map.remove(*field) {
                Some(Value::String(html)) => Some(Cow::Owned(html)),
                _ => None,
            })
            .unwrap_or(Cow::Borrowed(body)),
        _ => Cow::Borrowed(body),
    }
}
