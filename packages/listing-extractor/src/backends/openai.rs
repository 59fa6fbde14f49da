//! Hosted completion backend (OpenAI, strict JSON schema).

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient};

use super::{credentials::ApiKey, usage_or_estimate, ModelEntry};
use crate::error::Result;
use crate::traits::backend::{parse_json_reply, ExtractionBackend, Generation, GenerationRequest};

/// Temperature used when the caller does not set one.
const DEFAULT_TEMPERATURE: f32 = 0.0;

/// OpenAI chat completions constrained by a `json_schema` response format.
#[derive(Clone)]
pub struct OpenAIBackend {
    client: OpenAIClient,
    entry: ModelEntry,
}

impl OpenAIBackend {
    pub fn new(entry: ModelEntry, api_key: &ApiKey) -> Self {
        Self {
            client: OpenAIClient::new(api_key.expose()),
            entry,
        }
    }

    /// Set a custom base URL (Azure, proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl ExtractionBackend for OpenAIBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports(&self, model: &str) -> bool {
        model == self.entry.id
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let mut chat = ChatRequest::new(&self.entry.wire_model)
            .message(Message::system(&request.system))
            .message(Message::user(&request.user))
            .temperature(request.options.temperature_or(DEFAULT_TEMPERATURE))
            .json_schema(&request.schema_name, request.response_schema.clone());
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
    use crate::backends::BackendKind;
    use crate::error::ExtractionError;
    use crate::types::{options::GenerationOptions, schema::SchemaBuilder};

    fn backend() -> OpenAIBackend {
        OpenAIBackend::new(
            ModelEntry::new("gpt-4o-mini", BackendKind::HostedCompletion, "gpt-4o-mini"),
            &ApiKey::new("sk-test"),
        )
        .with_base_url("http://127.0.0.1:9")
    }

    #[test]
    fn test_supports_only_its_model() {
        let backend = backend();
        assert!(backend.supports("gpt-4o-mini"));
        assert!(!backend.supports("gpt-4o-2024-08-06"));
        assert!(backend.enforces_schema());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let schema = SchemaBuilder::from_names(["title"]).build().unwrap();
        let err = backend()
            .extract("page", &schema, "gpt-4o-mini", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Transport(_)), "{:?}", err);
    }
}
