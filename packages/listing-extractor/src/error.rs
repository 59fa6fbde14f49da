//! Typed errors for the extraction pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell
//! batch-fatal configuration problems apart from per-URL failures.

use thiserror::Error;

/// Errors that can occur while extracting listings.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Request can never succeed (bad fields, unknown model, missing price or key)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fetching the source page failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Backend call failed in transport (network, timeout, non-2xx)
    #[error("backend transport error: {0}")]
    Transport(String),

    /// Backend answered with something that is not the requested JSON shape
    #[error("malformed backend response: {0}")]
    Parse(String),

    /// Writing to the persistence sink failed
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    /// A per-call deadline elapsed
    #[error("timed out after {seconds}s during {stage}")]
    Timeout { stage: &'static str, seconds: u64 },
}

impl ExtractionError {
    /// Errors that only affect the URL being processed.
    ///
    /// Everything else stops the batch.
    pub fn is_per_url(&self) -> bool {
        matches!(
            self,
            ExtractionError::Fetch(_)
                | ExtractionError::Transport(_)
                | ExtractionError::Parse(_)
                | ExtractionError::Timeout { .. }
        )
    }
}

impl From<openai_client::OpenAIError> for ExtractionError {
    fn from(err: openai_client::OpenAIError) -> Self {
        use openai_client::OpenAIError;

        match err {
            OpenAIError::Config(msg) => ExtractionError::Config(ConfigError::Backend(msg)),
            OpenAIError::Parse(msg) => ExtractionError::Parse(msg),
            other => ExtractionError::Transport(other.to_string()),
        }
    }
}

/// Configuration errors. Raised before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No fields were requested in structured mode
    #[error("at least one field is required")]
    NoFields,

    /// A field name was empty or whitespace
    #[error("field names must not be empty (position {position})")]
    EmptyFieldName { position: usize },

    /// The same field was requested twice
    #[error("duplicate field name: {name}")]
    DuplicateField { name: String },

    /// The caller passed a field that collides with the implicit `source` column
    #[error("field name '{name}' is reserved")]
    ReservedField { name: String },

    /// Model is not in the backend catalog
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// Model has no entry in the pricing table
    #[error("no pricing entry for model: {model}")]
    MissingPricing { model: String },

    /// Pricing entry is unusable
    #[error("invalid pricing for {model}: {reason}")]
    InvalidPricing { model: String, reason: String },

    /// A backend or fetcher needs a credential that was not provided
    #[error("missing credential: {name}")]
    MissingCredential { name: String },

    /// Backend client could not be constructed
    #[error("backend setup failed: {0}")]
    Backend(String),

    /// Pricing file could not be read
    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Errors from the fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Source (or scrape API) answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Page fetched but carried no text
    #[error("no content returned for {url}")]
    Empty { url: String },

    /// Connection timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },
}

/// Errors from persistence sinks.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote spreadsheet rejected the append
    #[error("remote append failed: {0}")]
    Remote(String),

    /// Append was called before the sink was opened
    #[error("sink not opened")]
    NotOpened,

    /// Existing file was written with other columns
    #[error("{path} has columns [{found}], expected [{expected}]")]
    LayoutMismatch {
        path: String,
        found: String,
        expected: String,
    },
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for sink operations.
pub type PersistResult<T> = std::result::Result<T, PersistError>;
