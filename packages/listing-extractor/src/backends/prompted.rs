//! Prompt-only backends on OpenAI-compatible servers.
//!
//! Covers a local inference server (LM Studio and friends) and Groq. Neither
//! is sent a response schema: the system prompt carries the JSON shape and
//! the reply is parsed by hand, tolerating markdown fences.

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient};

use super::{credentials::ApiKey, usage_or_estimate, ModelEntry, GROQ_BASE_URL};
use crate::error::Result;
use crate::traits::backend::{parse_json_reply, ExtractionBackend, Generation, GenerationRequest};

/// LM Studio ignores the key but the protocol requires one.
const LOCAL_API_KEY: &str = "lm-studio";

/// Sampling temperature the local server runs at unless told otherwise.
const LOCAL_TEMPERATURE: f32 = 0.7;

/// Plain-prompt completion against an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct PromptedBackend {
    client: OpenAIClient,
    entry: ModelEntry,
    label: &'static str,
    default_temperature: Option<f32>,
}

impl PromptedBackend {
    /// Local inference server at `base_url`.
    pub fn local(entry: ModelEntry, base_url: &str) -> Self {
        Self {
            client: OpenAIClient::new(LOCAL_API_KEY).with_base_url(base_url),
            entry,
            label: "local",
            default_temperature: Some(LOCAL_TEMPERATURE),
        }
    }

    /// Groq's hosted endpoint.
    pub fn groq(entry: ModelEntry, api_key: &ApiKey) -> Self {
        Self {
            client: OpenAIClient::new(api_key.expose()).with_base_url(GROQ_BASE_URL),
            entry,
            label: "groq",
            default_temperature: None,
        }
    }

    /// Point at a different server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }
}

#[async_trait]
impl ExtractionBackend for PromptedBackend {
    fn name(&self) -> &str {
        self.label
    }

    fn supports(&self, model: &str) -> bool {
        model == self.entry.id
    }

    fn enforces_schema(&self) -> bool {
        false
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let mut chat = ChatRequest::new(&self.entry.wire_model)
            .message(Message::system(&request.system))
            .message(Message::user(&request.user));
        if let Some(temperature) = request.options.temperature.or(self.default_temperature) {
            chat = chat.temperature(temperature);
        }
        if let Some(max_tokens) = request.options.max_output_tokens {
            chat = chat.max_tokens(max_tokens);
        }

        let response = self.client.chat_completion(chat).await?;
        let value = parse_json_reply(&response.content)?;
        let usage = usage_or_estimate(response.usage.map(Into::into), request, &response.content);

        Ok(Generation::new(value, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendKind, LOCAL_BASE_URL};
    use crate::error::ExtractionError;
    use crate::types::{options::GenerationOptions, schema::SchemaBuilder};

    fn local_entry() -> ModelEntry {
        ModelEntry::new("Llama3.1 8B", BackendKind::LocalInference, "llama")
    }

    #[test]
    fn test_local_defaults() {
        let backend = PromptedBackend::local(local_entry(), LOCAL_BASE_URL);
        assert_eq!(backend.name(), "local");
        assert_eq!(backend.base_url(), "http://localhost:1234/v1");
        assert_eq!(backend.default_temperature, Some(0.7));
    }

    #[test]
    fn test_groq_endpoint() {
        let entry = ModelEntry::new("Groq Llama3.1 70b", BackendKind::ThirdPartyHosted, "llama");
        let backend = PromptedBackend::groq(entry, &ApiKey::new("gq"));
        assert_eq!(backend.base_url(), GROQ_BASE_URL);
        assert_eq!(backend.default_temperature, None);
    }

    #[tokio::test]
    async fn test_server_down_is_transport_error() {
        let backend = PromptedBackend::local(local_entry(), "http://127.0.0.1:9/v1");
        let schema = SchemaBuilder::from_names(["title"]).build().unwrap();

        let err = backend
            .extract("page", &schema, "Llama3.1 8B", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Transport(_)), "{:?}", err);
    }
}
