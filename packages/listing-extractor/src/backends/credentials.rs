//! API keys with secure memory.
//!
//! Uses the `secrecy` crate to prevent accidental logging of keys.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::error::ConfigError;

/// A credential that won't be logged or displayed.
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the key for use in a request header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Provider credentials for building backends.
///
/// Only the key for the selected model's provider is required.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai: Option<ApiKey>,
    pub google: Option<ApiKey>,
    pub groq: Option<ApiKey>,

    /// Base URL of the local inference server. Defaults to LM Studio's.
    pub local_base_url: Option<String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `OPENAI_API_KEY`, `GOOGLE_API_KEY`, `GROQ_API_KEY` and
    /// `LOCAL_LLM_BASE_URL`. Blank values count as unset.
    pub fn from_env() -> Self {
        Self {
            openai: env_key("OPENAI_API_KEY"),
            google: env_key("GOOGLE_API_KEY"),
            groq: env_key("GROQ_API_KEY"),
            local_base_url: env_value("LOCAL_LLM_BASE_URL"),
        }
    }

    pub fn with_openai(mut self, key: impl Into<ApiKey>) -> Self {
        self.openai = Some(key.into());
        self
    }

    pub fn with_google(mut self, key: impl Into<ApiKey>) -> Self {
        self.google = Some(key.into());
        self
    }

    pub fn with_groq(mut self, key: impl Into<ApiKey>) -> Self {
        self.groq = Some(key.into());
        self
    }

    pub fn with_local_base_url(mut self, url: impl Into<String>) -> Self {
        self.local_base_url = Some(url.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai", &self.openai.as_ref().map(|_| "[REDACTED]"))
            .field("google", &self.google.as_ref().map(|_| "[REDACTED]"))
            .field("groq", &self.groq.as_ref().map(|_| "[REDACTED]"))
            .field("local_base_url", &self.local_base_url)
            .finish()
    }
}

/// Require a key, naming the variable that should have held it.
pub(crate) fn require<'a>(key: &'a Option<ApiKey>, name: &str) -> Result<&'a ApiKey, ConfigError> {
    key.as_ref().ok_or_else(|| ConfigError::MissingCredential {
        name: name.to_string(),
    })
}

/// Read a non-blank environment variable.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a non-blank environment variable as a key.
pub fn env_key(name: &str) -> Option<ApiKey> {
    env_value(name).map(ApiKey::new)
}
