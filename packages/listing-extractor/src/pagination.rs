//! Pagination discovery.
//!
//! One backend call against the first page of a batch, asking the model for
//! the URLs of the listing's other pages. Results are resolved against the
//! page URL, de-duplicated and restricted to http(s).

use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use openai_client::StructuredOutput;

use crate::error::{ConfigError, ExtractionError, PersistResult, Result};
use crate::pricing::CostAccountant;
use crate::prompts;
use crate::tokens::truncate_to_tokens;
use crate::traits::backend::{ExtractionBackend, GenerationRequest};
use crate::types::{options::GenerationOptions, usage::TokenUsage};

/// Header of the single-column pagination CSV.
pub const PAGE_URLS_COLUMN: &str = "Page URLs";

/// Shape the model must return.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PageLinks {
    /// URLs of the other pages of this listing
    pub page_urls: Vec<String>,
}

/// Outcome of a pagination pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaginationResult {
    /// Page the pass ran against
    pub page_url: String,
    /// Discovered page URLs, absolute and unique
    pub urls: Vec<String>,
    pub usage: TokenUsage,
    pub cost: f64,
}

impl PaginationResult {
    /// Write the URLs as a single-column CSV with a `Page URLs` header.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> PersistResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([PAGE_URLS_COLUMN])?;
        for url in &self.urls {
            writer.write_record([url])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the URLs as a JSON array of strings.
    pub fn write_json(&self, path: impl AsRef<Path>) -> PersistResult<()> {
        let json = serde_json::to_string_pretty(&self.urls)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Read URLs back from a pagination CSV.
pub fn read_urls_csv(path: impl AsRef<Path>) -> PersistResult<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut urls = Vec::new();
    for row in reader.records() {
        if let Some(url) = row?.get(0).map(str::trim).filter(|u| !u.is_empty()) {
            urls.push(url.to_string());
        }
    }
    Ok(urls)
}

/// Read URLs back from a pagination JSON array.
pub fn read_urls_json(path: impl AsRef<Path>) -> PersistResult<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Finds the other pages of a paginated listing.
#[derive(Clone)]
pub struct PaginationDetector {
    backend: Arc<dyn ExtractionBackend>,
    accountant: CostAccountant,
    options: GenerationOptions,
}

impl PaginationDetector {
    pub fn new(backend: Arc<dyn ExtractionBackend>, accountant: CostAccountant) -> Self {
        Self {
            backend,
            accountant,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Ask the model for pagination URLs on the page at `url`.
    ///
    /// Returns an empty list (not an error) when the page has no pagination.
    pub async fn detect(
        &self,
        url: &str,
        hint: Option<&str>,
        model: &str,
        text: &str,
    ) -> Result<PaginationResult> {
        if !self.backend.supports(model) {
            return Err(ConfigError::UnsupportedModel {
                model: model.to_string(),
            }
            .into());
        }
        self.accountant.ensure_priced(model)?;

        let content = truncate_to_tokens(text, model, self.options.max_input_tokens);
        let request = GenerationRequest::new(
            model,
            prompts::PAGINATION_SYSTEM_PROMPT,
            prompts::format_pagination_user_prompt(url, hint, content),
        )
        .with_schema(PageLinks::type_name(), PageLinks::openai_schema())
        .with_options(self.options.clone());

        let generation = self.backend.generate(&request).await?;
        let raw = page_urls(generation.value)?;
        let urls = resolve_urls(url, &raw);
        let cost = self.accountant.price(generation.usage, model)?;

        debug!(url = %url, returned = raw.len(), kept = urls.len(), "Pagination links resolved");
        info!(url = %url, pages = urls.len(), cost, "Pagination detection complete");

        Ok(PaginationResult {
            page_url: url.to_string(),
            urls,
            usage: generation.usage,
            cost,
        })
    }
}

/// Pull the URL list out of the model reply.
fn page_urls(value: Value) -> Result<Vec<String>> {
    let links = match value {
        Value::Array(_) => PageLinks {
            page_urls: serde_json::from_value(value)
                .map_err(|e| ExtractionError::Parse(format!("page_urls: {}", e)))?,
        },
        Value::Object(ref map) if map.get("page_urls").map_or(true, Value::is_null) => {
            PageLinks { page_urls: Vec::new() }
        }
        other => serde_json::from_value(other)
            .map_err(|e| ExtractionError::Parse(format!("page_urls: {}", e)))?,
    };
    Ok(links.page_urls)
}

/// Resolve `links` against `page_url`, keep http(s) only, drop duplicates.
pub fn resolve_urls(page_url: &str, links: &[String]) -> Vec<String> {
    let base = url::Url::parse(page_url).ok();
    let mut seen = IndexSet::new();

    for link in links.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let resolved = match &base {
            Some(base) => base.join(link),
            None => url::Url::parse(link),
        };
        if let Ok(resolved) = resolved {
            if matches!(resolved.scheme(), "http" | "https") {
                seen.insert(resolved.to_string());
            }
        }
    }

    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use serde_json::json;

    fn detector(backend: MockBackend) -> PaginationDetector {
        PaginationDetector::new(Arc::new(backend), CostAccountant::default())
    }

    #[test]
    fn test_resolve_urls() {
        let links = vec![
            "/listings?page=2".to_string(),
            "https://example.com/listings?page=3".to_string(),
            "https://example.com/listings?page=2".to_string(),
            "mailto:sales@example.com".to_string(),
            "  ".to_string(),
        ];
        let urls = resolve_urls("https://example.com/listings", &links);
        assert_eq!(
            urls,
            vec![
                "https://example.com/listings?page=2",
                "https://example.com/listings?page=3"
            ]
        );
    }

    #[test]
    fn test_page_urls_shapes() {
        assert_eq!(
            page_urls(json!({"page_urls": ["a"]})).unwrap(),
            vec!["a".to_string()]
        );
        assert_eq!(page_urls(json!(["b"])).unwrap(), vec!["b".to_string()]);
        assert!(page_urls(json!({})).unwrap().is_empty());
        assert!(matches!(
            page_urls(json!({"page_urls": "a"})),
            Err(ExtractionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_no_links_is_empty_result() {
        let backend = MockBackend::new().with_default_reply(json!({"page_urls": []}), TokenUsage::new(50, 3));
        let result = detector(backend)
            .detect("https://example.com", None, "gpt-4o-mini", "A page with no links")
            .await
            .unwrap();

        assert!(result.urls.is_empty());
        assert_eq!(result.usage, TokenUsage::new(50, 3));
        assert!(result.cost >= 0.0);
    }

    #[tokio::test]
    async fn test_detect_resolves_and_prices() {
        let backend = MockBackend::new().with_default_reply(
            json!({"page_urls": ["?page=2", "?page=3", "?page=2"]}),
            TokenUsage::new(1_000_000, 0),
        );
        let result = detector(backend)
            .detect("https://example.com/cars", Some("numbered links"), "gpt-4o-mini", "text")
            .await
            .unwrap();

        assert_eq!(
            result.urls,
            vec![
                "https://example.com/cars?page=2",
                "https://example.com/cars?page=3"
            ]
        );
        assert!((result.cost - 0.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unpriced_model_is_config_error() {
        let backend = MockBackend::new();
        let err = detector(backend)
            .detect("https://example.com", None, "unpriced", "text")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Config(ConfigError::MissingPricing { .. })
        ));
    }

    #[test]
    fn test_artifacts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let result = PaginationResult {
            page_url: "https://example.com".to_string(),
            urls: vec![
                "https://example.com/?page=3".to_string(),
                "https://example.com/?page=2".to_string(),
            ],
            ..Default::default()
        };

        let csv_path = dir.path().join("pagination_urls.csv");
        result.write_csv(&csv_path).unwrap();
        let header = std::fs::read_to_string(&csv_path).unwrap();
        assert!(header.starts_with("Page URLs\n"));
        assert_eq!(read_urls_csv(&csv_path).unwrap(), result.urls);

        let json_path = dir.path().join("pagination_urls.json");
        result.write_json(&json_path).unwrap();
        assert_eq!(read_urls_json(&json_path).unwrap(), result.urls);
    }
}
