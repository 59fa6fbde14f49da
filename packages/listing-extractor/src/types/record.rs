//! Extracted records and the result of one backend call.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{ExtractionSchema, SOURCE_FIELD};

/// One extracted listing: field name → value, always including `source`.
///
/// Key order follows the schema, so serialized records and table rows line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: IndexMap<String, String>,
}

impl Record {
    /// Build a record from a model-produced JSON object.
    ///
    /// Only schema fields are kept, missing ones become empty strings and
    /// `source` starts empty until [`Record::set_source`] is called.
    pub fn from_json(schema: &ExtractionSchema, object: &serde_json::Map<String, Value>) -> Self {
        let mut values: IndexMap<String, String> = schema
            .fields()
            .iter()
            .map(|f| {
                let value = object.get(&f.name).map(stringify).unwrap_or_default();
                (f.name.clone(), value)
            })
            .collect();
        values.insert(SOURCE_FIELD.to_string(), String::new());

        Self { values }
    }

    /// Raw-only record: just the page text and its URL.
    pub fn raw(url: impl Into<String>, content: impl Into<String>) -> Self {
        let mut values = IndexMap::new();
        values.insert(RAW_CONTENT_FIELD.to_string(), content.into());
        values.insert(SOURCE_FIELD.to_string(), url.into());
        Self { values }
    }

    /// Value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Originating URL.
    pub fn source(&self) -> &str {
        self.get(SOURCE_FIELD).unwrap_or_default()
    }

    /// Tag the record with its originating URL.
    pub fn set_source(&mut self, url: impl Into<String>) {
        self.values.insert(SOURCE_FIELD.to_string(), url.into());
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of keys including `source`.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Key under which raw-only records carry the page text.
pub const RAW_CONTENT_FIELD: &str = "Scraped_Content";

/// Output of one backend call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub records: Vec<Record>,
}

impl ExtractionResult {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Interpret a model response against the schema.
    ///
    /// Accepts `{"listings": [...]}`, a bare array of objects, or a single
    /// object holding schema fields. Anything else is a parse failure.
    pub fn from_json(schema: &ExtractionSchema, value: &Value) -> Result<Self, String> {
        let items: Vec<&serde_json::Map<String, Value>> = match value {
            Value::Object(map) => match map.get("listings") {
                Some(Value::Array(items)) => collect_objects(items)?,
                Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(format!("'listings' must be an array, got {}", kind(other)))
                }
                None if schema.fields().iter().any(|f| map.contains_key(&f.name)) => vec![map],
                None => return Err("response has no 'listings' array".to_string()),
            },
            Value::Array(items) => collect_objects(items)?,
            other => return Err(format!("expected a JSON object, got {}", kind(other))),
        };

        Ok(Self {
            records: items
                .into_iter()
                .map(|obj| Record::from_json(schema, obj))
                .collect(),
        })
    }

    /// Set `source` on every record.
    pub fn tag_source(&mut self, url: &str) {
        for record in &mut self.records {
            record.set_source(url);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn collect_objects(items: &[Value]) -> Result<Vec<&serde_json::Map<String, Value>>, String> {
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| format!("listing entries must be objects, got {}", kind(item)))
        })
        .collect()
}

/// Flatten any JSON value into a single cell.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
