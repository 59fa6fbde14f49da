//! Extraction backend trait.
//!
//! A backend turns one prompt pair into a JSON value plus token usage. Each
//! provider only implements [`ExtractionBackend::generate`]; prompting,
//! truncation and interpretation of the reply against an [`ExtractionSchema`]
//! are shared in the provided [`ExtractionBackend::extract`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use listing_extractor::{ExtractionBackend, GenerationOptions, SchemaBuilder};
//!
//! let schema = SchemaBuilder::from_names(["title", "price"]).build()?;
//! let (result, usage) = backend
//!     .extract(&page_text, &schema, "gpt-4o-mini", &GenerationOptions::default())
//!     .await?;
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ExtractionError, Result};
use crate::prompts;
use crate::tokens::truncate_to_tokens;
use crate::types::{
    options::GenerationOptions, record::ExtractionResult, schema::ExtractionSchema,
    usage::TokenUsage,
};

/// One low-level call to a model.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Catalog model id
    pub model: String,

    /// System instruction
    pub system: String,

    /// User message, document text included
    pub user: String,

    /// Name under which the response schema is registered
    pub schema_name: String,

    /// JSON schema the reply must satisfy. Prompt-only backends ignore it.
    pub response_schema: Value,

    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            user: user.into(),
            schema_name: "response".to_string(),
            response_schema: Value::Object(Default::default()),
            options: GenerationOptions::default(),
        }
    }

    /// Attach the response schema.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.schema_name = name.into();
        self.response_schema = schema;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Reply of one low-level call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub value: Value,
    pub usage: TokenUsage,
}

impl Generation {
    pub fn new(value: Value, usage: TokenUsage) -> Self {
        Self { value, usage }
    }
}

/// A provider able to produce structured JSON from a prompt.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short provider label for logs.
    fn name(&self) -> &str;

    /// Whether this backend can serve `model`.
    fn supports(&self, model: &str) -> bool;

    /// Whether the provider enforces the response schema itself.
    ///
    /// Prompt-only backends get stricter output rules in the system prompt.
    fn enforces_schema(&self) -> bool {
        true
    }

    /// Send one request and return the parsed JSON reply.
    ///
    /// Transport failures map to [`ExtractionError::Transport`], unparseable
    /// replies to [`ExtractionError::Parse`]. Nothing is retried.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;

    /// Extract listings from a document.
    ///
    /// Unsupported models are rejected before any network call.
    async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<(ExtractionResult, TokenUsage)> {
        if !self.supports(model) {
            return Err(ConfigError::UnsupportedModel {
                model: model.to_string(),
            }
            .into());
        }

        let input = truncate_to_tokens(text, model, options.max_input_tokens);
        if input.len() < text.len() {
            debug!(
                model = %model,
                original_bytes = text.len(),
                kept_bytes = input.len(),
                "Truncated document to input token limit"
            );
        }

        let request = GenerationRequest::new(
            model,
            prompts::format_extract_system_prompt(schema, !self.enforces_schema()),
            prompts::format_extract_user_prompt(input),
        )
        .with_schema("listings", schema.listings_json_schema())
        .with_options(options.clone());

        let generation = self.generate(&request).await?;
        let result = ExtractionResult::from_json(schema, &generation.value)
            .map_err(ExtractionError::Parse)?;

        debug!(
            backend = self.name(),
            model = %model,
            records = result.len(),
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "Extraction complete"
        );

        Ok((result, generation.usage))
    }
}

/// Parse a plain-text model reply as JSON, tolerating markdown fences.
pub fn parse_json_reply(content: &str) -> Result<Value> {
    let body = openai_client::strip_code_blocks(content);
    if body.is_empty() {
        return Err(ExtractionError::Parse("model returned an empty reply".to_string()));
    }
    serde_json::from_str(body).map_err(|e| ExtractionError::Parse(format!("invalid JSON: {}", e)))
}
