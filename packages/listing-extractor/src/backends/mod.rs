//! Model catalog and the extraction backends behind it.
//!
//! Every model id maps to one [`BackendKind`] and the model name sent on the
//! wire. Call sites pick a model id; the catalog decides which backend serves
//! it, so no code outside this module branches on model names.
//!
//! ```rust,ignore
//! let catalog = ModelCatalog::default();
//! let backend = catalog.backend("gpt-4o-mini", &Credentials::from_env())?;
//! ```

pub mod credentials;
pub mod gemini;
pub mod openai;
pub mod prompted;

pub use credentials::{ApiKey, Credentials};
pub use gemini::GeminiBackend;
pub use openai::OpenAIBackend;
pub use prompted::PromptedBackend;

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::tokens::estimate_tokens;
use crate::traits::backend::{ExtractionBackend, GenerationRequest};
use crate::types::usage::TokenUsage;

/// Default base URL of a local LM Studio server.
pub const LOCAL_BASE_URL: &str = "http://localhost:1234/v1";

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// How a model is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OpenAI chat completions with a strict JSON schema
    HostedCompletion,
    /// Gemini `generateContent` with `responseSchema`
    GenerationSchema,
    /// OpenAI-compatible local server, plain prompt
    LocalInference,
    /// Groq, plain prompt
    ThirdPartyHosted,
}

impl BackendKind {
    /// Environment variable holding this kind's credential, if it needs one.
    pub fn credential_name(&self) -> Option<&'static str> {
        match self {
            BackendKind::HostedCompletion => Some("OPENAI_API_KEY"),
            BackendKind::GenerationSchema => Some("GOOGLE_API_KEY"),
            BackendKind::ThirdPartyHosted => Some("GROQ_API_KEY"),
            BackendKind::LocalInference => None,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    /// Id callers select the model by
    pub id: String,
    pub kind: BackendKind,
    /// Name sent to the provider
    pub wire_model: String,
}

impl ModelEntry {
    pub fn new(id: impl Into<String>, kind: BackendKind, wire_model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            wire_model: wire_model.into(),
        }
    }
}

/// Model id → backend kind and wire name.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: IndexMap<String, ModelEntry>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::empty()
            .with_entry(ModelEntry::new(
                "gpt-4o-mini",
                BackendKind::HostedCompletion,
                "gpt-4o-mini",
            ))
            .with_entry(ModelEntry::new(
                "gpt-4o-2024-08-06",
                BackendKind::HostedCompletion,
                "gpt-4o-2024-08-06",
            ))
            .with_entry(ModelEntry::new(
                "gemini-1.5-flash",
                BackendKind::GenerationSchema,
                "gemini-1.5-flash",
            ))
            .with_entry(ModelEntry::new(
                "Llama3.1 8B",
                BackendKind::LocalInference,
                "lmstudio-community/Meta-Llama-3.1-8B-Instruct-GGUF",
            ))
            .with_entry(ModelEntry::new(
                "Groq Llama3.1 70b",
                BackendKind::ThirdPartyHosted,
                "llama-3.1-70b-versatile",
            ))
    }
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Add or replace an entry.
    pub fn with_entry(mut self, entry: ModelEntry) -> Self {
        self.entries.insert(entry.id.clone(), entry);
        self
    }

    /// Look up a model id.
    pub fn get(&self, model: &str) -> Result<&ModelEntry, ConfigError> {
        self.entries
            .get(model)
            .ok_or_else(|| ConfigError::UnsupportedModel {
                model: model.to_string(),
            })
    }

    /// Model ids in catalog order.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ModelEntry> {
        self.entries.values()
    }

    /// Build the backend serving `model`.
    ///
    /// Fails without touching the network when the model is unknown or its
    /// provider's credential is missing.
    pub fn backend(
        &self,
        model: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ExtractionBackend>, ConfigError> {
        let entry = self.get(model)?.clone();

        let backend: Arc<dyn ExtractionBackend> = match entry.kind {
            BackendKind::HostedCompletion => {
                let key = credentials::require(&credentials.openai, "OPENAI_API_KEY")?;
                Arc::new(OpenAIBackend::new(entry, key))
            }
            BackendKind::GenerationSchema => {
                let key = credentials::require(&credentials.google, "GOOGLE_API_KEY")?;
                Arc::new(GeminiBackend::new(entry, key.clone()))
            }
            BackendKind::LocalInference => {
                let base_url = credentials
                    .local_base_url
                    .as_deref()
                    .unwrap_or(LOCAL_BASE_URL);
                Arc::new(PromptedBackend::local(entry, base_url))
            }
            BackendKind::ThirdPartyHosted => {
                let key = credentials::require(&credentials.groq, "GROQ_API_KEY")?;
                Arc::new(PromptedBackend::groq(entry, key))
            }
        };

        Ok(backend)
    }
}

/// Provider-reported usage, with any counter the provider left out (absent
/// or zero) estimated from the request and reply text.
pub(crate) fn usage_or_estimate(
    reported: Option<TokenUsage>,
    request: &GenerationRequest,
    reply: &str,
) -> TokenUsage {
    let reported = reported.unwrap_or_default();
    let input_tokens = match reported.input_tokens {
        0 => {
            estimate_tokens(&request.system, &request.model)
                + estimate_tokens(&request.user, &request.model)
        }
        n => n,
    };
    let output_tokens = match reported.output_tokens {
        0 => estimate_tokens(reply, &request.model),
        n => n,
    };
    TokenUsage::new(input_tokens, output_tokens)
}
