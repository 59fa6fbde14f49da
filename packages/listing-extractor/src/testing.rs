//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making real model calls.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ExtractionError, PersistError, PersistResult, Result};
use crate::traits::{
    backend::{ExtractionBackend, Generation, GenerationRequest},
    sink::{PersistenceSink, TableLayout},
};
use crate::types::{record::Record, usage::TokenUsage};

/// How a scripted backend call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Behave like a network error or non-2xx reply
    Transport,
    /// Behave like a reply that is not JSON
    Parse,
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Value, TokenUsage),
    Fail(MockFailure),
}

/// A mock backend for testing.
///
/// Replies are scripted by a marker string: the first rule whose marker
/// appears in the user message wins, otherwise the default reply is used.
/// Supports every model unless restricted with [`MockBackend::with_models`].
#[derive(Clone)]
pub struct MockBackend {
    rules: Arc<RwLock<Vec<(String, Scripted)>>>,
    default_reply: Arc<RwLock<(Value, TokenUsage)>>,
    models: Option<Arc<HashSet<String>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockBackendCall>>>,
}

/// Record of a call made to the mock backend.
#[derive(Debug, Clone)]
pub struct MockBackendCall {
    pub model: String,
    pub schema_name: String,
    pub user: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            rules: Arc::default(),
            default_reply: Arc::new(RwLock::new((json!({"listings": []}), TokenUsage::default()))),
            models: None,
            delay: None,
            calls: Arc::default(),
        }
    }
}

impl MockBackend {
    /// Create a mock that answers `{"listings": []}` with zero usage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply for any call without a matching rule.
    pub fn with_default_reply(self, value: Value, usage: TokenUsage) -> Self {
        *self.default_reply.write().unwrap() = (value, usage);
        self
    }

    /// Reply with `value` when `marker` appears in the user message.
    pub fn with_reply(self, marker: impl Into<String>, value: Value, usage: TokenUsage) -> Self {
        self.rules
            .write()
            .unwrap()
            .push((marker.into(), Scripted::Reply(value, usage)));
        self
    }

    /// Fail when `marker` appears in the user message.
    pub fn with_failure(self, marker: impl Into<String>, failure: MockFailure) -> Self {
        self.rules
            .write()
            .unwrap()
            .push((marker.into(), Scripted::Fail(failure)));
        self
    }

    /// Only serve these model ids.
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(Arc::new(models.into_iter().map(Into::into).collect()));
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockBackendCall> {
        self.calls.read().unwrap().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn script_for(&self, user: &str) -> Scripted {
        self.rules
            .read()
            .unwrap()
            .iter()
            .find(|(marker, _)| user.contains(marker.as_str()))
            .map(|(_, scripted)| scripted.clone())
            .unwrap_or_else(|| {
                let (value, usage) = self.default_reply.read().unwrap().clone();
                Scripted::Reply(value, usage)
            })
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, model: &str) -> bool {
        self.models.as_ref().map_or(true, |m| m.contains(model))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.calls.write().unwrap().push(MockBackendCall {
            model: request.model.clone(),
            schema_name: request.schema_name.clone(),
            user: request.user.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.script_for(&request.user) {
            Scripted::Reply(value, usage) => Ok(Generation::new(value, usage)),
            Scripted::Fail(MockFailure::Transport) => Err(ExtractionError::Transport(
                "mock transport failure".to_string(),
            )),
            Scripted::Fail(MockFailure::Parse) => {
                Err(ExtractionError::Parse("mock reply was not JSON".to_string()))
            }
        }
    }
}

/// A sink that accepts `fail_after` appends, then fails every later one.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    fail_after: usize,
    appended: Arc<RwLock<Vec<Vec<Record>>>>,
}

impl FailingSink {
    pub fn new(fail_after: usize) -> Self {
        Self {
            fail_after,
            appended: Arc::default(),
        }
    }

    /// Row groups accepted before the failure.
    pub fn appended(&self) -> Vec<Vec<Record>> {
        self.appended.read().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceSink for FailingSink {
    async fn open(&mut self, _layout: &TableLayout) -> PersistResult<()> {
        Ok(())
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        let mut appended = self.appended.write().unwrap();
        if appended.len() >= self.fail_after {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        appended.push(records.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{options::GenerationOptions, schema::SchemaBuilder};

    #[tokio::test]
    async fn test_mock_backend_rules() {
        let backend = MockBackend::new()
            .with_reply(
                "page one",
                json!({"listings": [{"title": "A"}]}),
                TokenUsage::new(10, 2),
            )
            .with_failure("page two", MockFailure::Parse);
        let schema = SchemaBuilder::from_names(["title"]).build().unwrap();
        let options = GenerationOptions::default();

        let (result, usage) = backend
            .extract("page one", &schema, "any", &options)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(usage, TokenUsage::new(10, 2));

        let err = backend
            .extract("page two", &schema, "any", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));

        let (result, _) = backend
            .extract("page three", &schema, "any", &options)
            .await
            .unwrap();
        assert!(result.is_empty());

        assert_eq!(backend.call_count(), 3);
    }

    #[test]
    fn test_mock_backend_model_restriction() {
        let backend = MockBackend::new().with_models(["gpt-4o-mini"]);
        assert!(backend.supports("gpt-4o-mini"));
        assert!(!backend.supports("unknown-model"));
    }

    #[tokio::test]
    async fn test_failing_sink() {
        let mut sink = FailingSink::new(1);
        let record = Record::raw("https://example.com", "text");

        sink.append(std::slice::from_ref(&record)).await.unwrap();
        assert!(sink.append(&[record]).await.is_err());
        assert_eq!(sink.appended().len(), 1);
    }
}
