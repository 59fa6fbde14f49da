//! Generation options passed to every backend call.

use serde::{Deserialize, Serialize};

/// Default cap on document size sent to a backend, in estimated tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 120_000;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature. `None` lets each backend pick its own default.
    pub temperature: Option<f32>,

    /// Cap on completion length.
    pub max_output_tokens: Option<u32>,

    /// Documents longer than this (estimated tokens) are truncated before sending.
    pub max_input_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            max_output_tokens: None,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
        }
    }
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max completion tokens.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Set the input truncation limit.
    pub fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = tokens;
        self
    }

    /// Temperature to send, falling back to the backend's default.
    pub fn temperature_or(&self, default: f32) -> f32 {
        self.temperature.unwrap_or(default)
    }
}
