//! Generation-API backend (Gemini `generateContent` with `responseSchema`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{credentials::ApiKey, usage_or_estimate, ModelEntry};
use crate::error::{ExtractionError, Result};
use crate::traits::backend::{parse_json_reply, ExtractionBackend, Generation, GenerationRequest};
use crate::types::usage::TokenUsage;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini with JSON output constrained by a response schema.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: ApiKey,
    entry: ModelEntry,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(entry: ModelEntry, api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            api_key,
            entry,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url, self.entry.wire_model
        )
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

/// Convert a JSON schema to the OpenAPI subset Gemini accepts.
///
/// Drops keywords Gemini rejects (`additionalProperties`, `title`, `$schema`)
/// and upper-cases `type` names.
pub fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| {
                    !matches!(key.as_str(), "additionalProperties" | "title" | "$schema")
                })
                .map(|(key, value)| {
                    let converted = match (key.as_str(), value) {
                        ("type", Value::String(t)) => Value::String(t.to_ascii_uppercase()),
                        ("properties", Value::Object(props)) => Value::Object(
                            props
                                .iter()
                                .map(|(name, prop)| (name.clone(), to_gemini_schema(prop)))
                                .collect(),
                        ),
                        ("required", other) => other.clone(),
                        (_, other) => to_gemini_schema(other),
                    };
                    (key.clone(), converted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl ExtractionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports(&self, model: &str) -> bool {
        model == self.entry.id
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: format!("{}\n{}", request.system, request.user),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: to_gemini_schema(&request.response_schema),
                temperature: request.options.temperature,
                max_output_tokens: request.options.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                warn!(error = %e, "Gemini request failed");
                ExtractionError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini API error");
            return Err(ExtractionError::Transport(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let raw: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.without_url().to_string()))?;

        let text: String = raw
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| ExtractionError::Parse("response contained no candidates".into()))?;

        let reported = raw
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count));

        debug!(
            model = %self.entry.wire_model,
            prompt_tokens = reported.map(|u| u.input_tokens),
            candidates_tokens = reported.map(|u| u.output_tokens),
            "Gemini generation"
        );

        let value = parse_json_reply(&text)?;
        let usage = usage_or_estimate(reported, request, &text);
        Ok(Generation::new(value, usage))
    }
}
