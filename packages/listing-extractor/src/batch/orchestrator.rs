//! Batch orchestration: fetch → extract → price → persist, per URL.
//!
//! A URL that fails to fetch or extract is logged, counted and skipped; it
//! never fails the batch. Configuration problems are caught before the first
//! fetch, and a persistence failure halts the run while keeping everything
//! accumulated so far.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{BatchProgress, BatchReport, BatchState, BatchStatus, UrlStage};
use crate::error::{ConfigError, ExtractionError, FetchError, Result};
use crate::pagination::PaginationDetector;
use crate::pricing::CostAccountant;
use crate::traits::{
    backend::ExtractionBackend,
    fetcher::Fetcher,
    sink::{PersistenceSink, TableLayout},
};
use crate::types::{
    document::RawDocument,
    options::GenerationOptions,
    record::Record,
    schema::{ExtractionSchema, SchemaBuilder},
    usage::TokenUsage,
};

/// Default deadline for one fetch or one backend call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// What to run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// URLs in processing order
    pub urls: Vec<String>,

    /// Fields to extract. `None` persists raw page text only.
    pub fields: Option<Vec<String>>,

    /// Catalog model id
    pub model: String,

    /// Run pagination detection on the first URL
    pub pagination: bool,

    /// Free-text description of how the site paginates
    pub pagination_hint: Option<String>,

    /// Queue discovered page URLs after the input URLs
    pub merge_discovered_urls: bool,
}

impl BatchRequest {
    pub fn new<I, S>(urls: I, model: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            fields: None,
            model: model.into(),
            pagination: false,
            pagination_hint: None,
            merge_discovered_urls: false,
        }
    }

    /// Extract these fields (structured mode).
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Enable pagination detection with an optional hint.
    pub fn with_pagination(mut self, hint: Option<String>) -> Self {
        self.pagination = true;
        self.pagination_hint = hint.filter(|h| !h.trim().is_empty());
        self
    }

    /// Process discovered page URLs too.
    pub fn merge_discovered_urls(mut self, merge: bool) -> Self {
        self.merge_discovered_urls = merge;
        self
    }

    /// Whether the run calls a model at all.
    pub fn needs_model(&self) -> bool {
        self.fields.is_some() || self.pagination
    }
}

/// Successful work for one URL, ready to persist.
struct Extracted {
    records: Vec<Record>,
    usage: TokenUsage,
    cost: f64,
}

/// Result of fetching and extracting one URL.
struct UrlWork {
    url: String,
    /// Page text, when the fetch succeeded
    text: Option<String>,
    outcome: std::result::Result<Extracted, (UrlStage, ExtractionError)>,
}

/// Drives a batch of URLs through fetch, extraction and persistence.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = BatchOrchestrator::new(fetcher, backend)
///     .with_concurrency(4)
///     .with_timeout(Duration::from_secs(60));
///
/// let request = BatchRequest::new(urls, "gpt-4o-mini").with_fields(["title", "price"]);
/// let report = orchestrator.run(&request, &mut sink).await?;
/// println!("{:?}", report.summary());
/// ```
pub struct BatchOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    backend: Arc<dyn ExtractionBackend>,
    accountant: CostAccountant,
    options: GenerationOptions,
    timeout: Duration,
    concurrency: usize,
    cancel: CancellationToken,
    progress: watch::Sender<BatchProgress>,
}

impl BatchOrchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, backend: Arc<dyn ExtractionBackend>) -> Self {
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            fetcher,
            backend,
            accountant: CostAccountant::default(),
            options: GenerationOptions::default(),
            timeout: DEFAULT_CALL_TIMEOUT,
            concurrency: 1,
            cancel: CancellationToken::new(),
            progress,
        }
    }

    /// Price usage with this accountant.
    pub fn with_accountant(mut self, accountant: CostAccountant) -> Self {
        self.accountant = accountant;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Deadline for each fetch and each backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URLs fetched and extracted at once. Appends stay in input order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Use an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the batch between URLs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Progress snapshots, one per processed URL.
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// Run a batch into `sink`.
    ///
    /// Returns `Err` only for configuration problems, before anything is
    /// fetched. Everything else ends in a [`BatchReport`].
    pub async fn run<S>(&self, request: &BatchRequest, sink: &mut S) -> Result<BatchReport>
    where
        S: PersistenceSink + ?Sized,
    {
        let schema = self.preflight(request)?;
        let layout = match &schema {
            Some(schema) => TableLayout::structured(schema),
            None => TableLayout::raw_only(),
        };

        let mut state = BatchState::new(request.urls.clone());
        state.status = BatchStatus::Running;
        self.publish(&state);

        info!(
            run_id = %state.run_id,
            urls = state.urls.len(),
            model = %request.model,
            structured = schema.is_some(),
            pagination = request.pagination,
            concurrency = self.concurrency,
            sink = sink.name(),
            fetcher = self.fetcher.name(),
            "Batch starting"
        );

        if let Err(e) = sink.open(&layout).await {
            warn!(error = %e, "Sink failed to open");
            return Ok(self.halt(state, e.into()));
        }

        let mut prefetched = None;
        if request.pagination && !self.cancel.is_cancelled() {
            if let Some(first) = state.urls.first().cloned() {
                let fetched = self.fetch(&first).await;
                if let Ok(doc) = &fetched {
                    self.detect_pagination(request, doc, &mut state).await;
                }
                prefetched = Some(fetched);
            }
        }

        let urls = state.urls.clone();
        let schema = schema.as_ref();
        let mut work = std::pin::pin!(stream::iter(urls.into_iter().enumerate())
            .map(move |(index, url)| {
                let reuse = if index == 0 { prefetched.take() } else { None };
                self.process_url(url, reuse, schema, &request.model)
            })
            .buffered(self.concurrency));

        let mut halted = None;
        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(processed = state.processed_count, "Batch cancelled");
                    state.cancelled = true;
                    break;
                }
                item = work.next() => item,
            };
            let Some(item) = item else { break };

            if let Some(text) = item.text {
                state.record_raw_text(&item.url, text);
            }

            match item.outcome {
                Ok(extracted) => {
                    if let Err(e) = sink.append(&extracted.records).await {
                        warn!(url = %item.url, error = %e, "Persisting records failed, halting batch");
                        let error = ExtractionError::from(e);
                        state.record_failure(&item.url, UrlStage::Persisting, &error);
                        halted = Some(error);
                        break;
                    }
                    debug!(
                        url = %item.url,
                        records = extracted.records.len(),
                        cost = extracted.cost,
                        "URL persisted"
                    );
                    state.record_success(&item.url, extracted.records, extracted.usage, extracted.cost);
                }
                Err((stage, e)) if e.is_per_url() => {
                    warn!(url = %item.url, stage = %stage, error = %e, "URL failed, continuing");
                    state.record_failure(&item.url, stage, &e);
                }
                Err((stage, e)) => {
                    warn!(url = %item.url, stage = %stage, error = %e, "Unrecoverable error, halting batch");
                    state.record_failure(&item.url, stage, &e);
                    halted = Some(e);
                    break;
                }
            }
            self.publish(&state);
        }

        if let Some(error) = halted {
            return Ok(self.halt(state, error));
        }
        state.status = BatchStatus::Completed;
        self.publish(&state);

        let summary = state.summary();
        info!(
            run_id = %state.run_id,
            processed = summary.processed_count,
            failed = summary.failed_count,
            input_tokens = summary.input_tokens,
            output_tokens = summary.output_tokens,
            total_cost = summary.total_cost,
            cancelled = state.cancelled,
            "Batch finished"
        );

        Ok(BatchReport { state, error: None })
    }

    /// Validate everything that can be validated without the network.
    fn preflight(&self, request: &BatchRequest) -> Result<Option<ExtractionSchema>> {
        let schema = request
            .fields
            .as_ref()
            .map(|fields| SchemaBuilder::from_names(fields).build())
            .transpose()?;

        if request.needs_model() {
            if !self.backend.supports(&request.model) {
                return Err(ConfigError::UnsupportedModel {
                    model: request.model.clone(),
                }
                .into());
            }
            self.accountant.ensure_priced(&request.model)?;
        }

        Ok(schema)
    }

    async fn detect_pagination(
        &self,
        request: &BatchRequest,
        doc: &RawDocument,
        state: &mut BatchState,
    ) {
        let detector = PaginationDetector::new(self.backend.clone(), self.accountant.clone())
            .with_options(self.options.clone());
        let detected = self
            .with_deadline(
                "pagination",
                detector.detect(
                    &doc.url,
                    request.pagination_hint.as_deref(),
                    &request.model,
                    &doc.text,
                ),
            )
            .await;

        match detected {
            Ok(result) => {
                if request.merge_discovered_urls {
                    let known: Vec<String> = state.urls.iter().map(|u| normalize(u)).collect();
                    let added: Vec<String> = result
                        .urls
                        .iter()
                        .filter(|u| !known.contains(&normalize(u)))
                        .cloned()
                        .collect();
                    info!(added = added.len(), "Queueing discovered page URLs");
                    state.urls.extend(added);
                }
                state.pagination = Some(result);
            }
            Err(e) => {
                warn!(url = %doc.url, error = %e, "Pagination detection failed, continuing without it");
            }
        }
    }

    /// Fetch and extract one URL. Touches no shared state.
    async fn process_url(
        &self,
        url: String,
        prefetched: Option<std::result::Result<RawDocument, ExtractionError>>,
        schema: Option<&ExtractionSchema>,
        model: &str,
    ) -> UrlWork {
        let fetched = match prefetched {
            Some(fetched) => fetched,
            None => self.fetch(&url).await,
        };
        let doc = match fetched {
            Ok(doc) => doc,
            Err(e) => {
                return UrlWork {
                    url,
                    text: None,
                    outcome: Err((UrlStage::Fetching, e)),
                }
            }
        };

        let outcome = match schema {
            Some(schema) => self.extract(&doc, schema, model).await,
            None => Ok(Extracted {
                records: vec![Record::raw(&url, doc.text.clone())],
                usage: TokenUsage::default(),
                cost: 0.0,
            }),
        };

        UrlWork {
            url,
            text: Some(doc.text),
            outcome: outcome.map_err(|e| (UrlStage::Extracting, e)),
        }
    }

    async fn fetch(&self, url: &str) -> Result<RawDocument> {
        debug!(url = %url, "Fetching");
        let doc = self
            .with_deadline("fetch", async {
                self.fetcher.fetch(url).await.map_err(ExtractionError::from)
            })
            .await?;
        if !doc.has_content() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            }
            .into());
        }
        Ok(doc)
    }

    async fn extract(&self, doc: &RawDocument, schema: &ExtractionSchema, model: &str) -> Result<Extracted> {
        let (mut result, usage) = self
            .with_deadline(
                "extraction",
                self.backend.extract(&doc.text, schema, model, &self.options),
            )
            .await?;
        let cost = self.accountant.price(usage, model)?;
        result.tag_source(&doc.url);

        Ok(Extracted {
            records: result.records,
            usage,
            cost,
        })
    }

    async fn with_deadline<T>(
        &self,
        stage: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(ExtractionError::Timeout {
                    stage,
                    seconds: self.timeout.as_secs(),
                })
            })
    }

    fn halt(&self, mut state: BatchState, error: ExtractionError) -> BatchReport {
        state.status = BatchStatus::Halted {
            reason: error.to_string(),
        };
        self.publish(&state);
        BatchReport {
            state,
            error: Some(error),
        }
    }

    fn publish(&self, state: &BatchState) {
        self.progress.send_replace(state.progress());
    }
}

/// Compare URLs in parsed form so `https://a.com` and `https://a.com/` match.
fn normalize(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::MockFetcher;
    use crate::sinks::MemorySink;
    use crate::testing::MockBackend;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = BatchRequest::new(["https://a"], "gpt-4o-mini")
            .with_fields(["title"])
            .with_pagination(Some("  ".to_string()))
            .merge_discovered_urls(true);

        assert_eq!(request.fields, Some(vec!["title".to_string()]));
        assert!(request.pagination);
        assert_eq!(request.pagination_hint, None);
        assert!(request.merge_discovered_urls);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("https://a.com"), normalize("https://a.com/"));
        assert_eq!(normalize("not a url"), "not a url");
    }

    #[tokio::test]
    async fn test_blank_document_is_fetch_failure() {
        let fetcher = MockFetcher::new().with_page("https://a.com/", "   \n ");
        let orchestrator = BatchOrchestrator::new(Arc::new(fetcher), Arc::new(MockBackend::new()));
        let mut sink = MemorySink::new();

        let report = orchestrator
            .run(&BatchRequest::new(["https://a.com/"], "gpt-4o-mini"), &mut sink)
            .await
            .unwrap();

        assert_eq!(report.state.failed_count(), 1);
        assert!(matches!(
            &report.state.outcomes[0],
            crate::batch::UrlOutcome::Failed { stage: UrlStage::Fetching, .. }
        ));
        assert!(sink.groups().is_empty());
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_per_url() {
        let fetcher = MockFetcher::new()
            .with_page("https://a.com/1", "one")
            .with_page("https://a.com/2", "two");
        let backend = MockBackend::new()
            .with_reply("two", json!({"listings": [{"title": "T"}]}), TokenUsage::new(1, 1))
            .with_delay(Duration::from_millis(200));

        let orchestrator = BatchOrchestrator::new(Arc::new(fetcher), Arc::new(backend))
            .with_timeout(Duration::from_millis(50));
        let mut sink = MemorySink::new();
        let request = BatchRequest::new(["https://a.com/1", "https://a.com/2"], "gpt-4o-mini")
            .with_fields(["title"]);

        let report = orchestrator.run(&request, &mut sink).await.unwrap();
        assert_eq!(report.state.processed_count, 2);
        assert_eq!(report.state.failed_count(), 2);
        assert!(report.state.outcomes.iter().all(|o| matches!(
            o,
            crate::batch::UrlOutcome::Failed { stage: UrlStage::Extracting, reason, .. } if reason.contains("timed out")
        )));
    }
}
