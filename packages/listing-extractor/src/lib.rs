//! Listing Extraction Library
//!
//! Turns a list of web pages into rows of user-defined fields. Each page is
//! fetched as markdown-like text, handed to an LLM backend with a response
//! schema built from the requested field names, priced, and appended to one
//! or more persistence sinks.
//!
//! # Design Philosophy
//!
//! - Field names in, rows out. No per-site selectors.
//! - One failing URL never fails the batch
//! - Backends are interchangeable behind one trait
//! - Cost is tracked per call, per URL and per batch
//!
//! # Usage
//!
//! ```rust,ignore
//! use listing_extractor::{
//!     BatchOrchestrator, BatchRequest, Credentials, CsvSink, HttpFetcher, ModelCatalog,
//! };
//! use std::sync::Arc;
//!
//! let backend = ModelCatalog::default().backend("gpt-4o-mini", &Credentials::from_env())?;
//! let orchestrator = BatchOrchestrator::new(Arc::new(HttpFetcher::new()), backend);
//!
//! let request = BatchRequest::new(urls, "gpt-4o-mini").with_fields(["title", "price"]);
//! let mut sink = CsvSink::new("output/all_sorted_data.csv");
//! let report = orchestrator.run(&request, &mut sink).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (ExtractionBackend, Fetcher, PersistenceSink)
//! - [`types`] - Schema, records, usage and options
//! - [`backends`] - Model catalog and provider backends
//! - [`fetchers`] - Page fetchers (plain HTTP, RapidAPI, Firecrawl)
//! - [`sinks`] - CSV, JSON, Google Sheets and in-memory sinks
//! - [`pagination`] - Pagination URL discovery
//! - [`pricing`] - Per-model prices and cost accounting
//! - [`batch`] - Batch orchestration with per-URL failure isolation
//! - [`testing`] - Mock implementations for testing

pub mod backends;
pub mod batch;
pub mod error;
pub mod fetchers;
pub mod pagination;
pub mod pricing;
pub mod prompts;
pub mod sinks;
pub mod testing;
pub mod tokens;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use backends::{ApiKey, BackendKind, Credentials, ModelCatalog, ModelEntry};
pub use batch::{
    BatchOrchestrator, BatchProgress, BatchReport, BatchRequest, BatchState, BatchStatus,
    BatchSummary, UrlOutcome, UrlStage,
};
pub use error::{ConfigError, ExtractionError, FetchError, PersistError};
pub use fetchers::{FirecrawlFetcher, HttpFetcher, MockFetcher, RapidApiFetcher, ScrapeMode};
pub use pagination::{PaginationDetector, PaginationResult};
pub use pricing::{CostAccountant, ModelPrice, PricingTable};
pub use sinks::{CsvSink, FanOutSink, JsonSink, MemorySink, SheetsSink};
pub use traits::{
    backend::{ExtractionBackend, Generation, GenerationRequest},
    fetcher::Fetcher,
    sink::{PersistenceSink, TableLayout},
};
pub use types::{
    document::RawDocument,
    options::GenerationOptions,
    record::{ExtractionResult, Record},
    schema::{ExtractionSchema, FieldSpec, FieldType, SchemaBuilder},
    usage::TokenUsage,
};
