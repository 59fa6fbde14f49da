//! Extraction schema - the ordered set of fields a batch asks the model for.
//!
//! The schema is plain data: every backend and every sink iterates over the
//! same field list instead of generating record types at run time.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::error::ConfigError;

/// Implicit field carrying the originating URL of every record.
pub const SOURCE_FIELD: &str = "source";

/// Type of a requested field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A single string value
    Text,

    /// A list of strings (flattened to a comma-separated cell when persisted)
    TextList,
}

/// One requested extraction column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    /// A plain text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
        }
    }

    /// A list-of-strings field.
    pub fn text_list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::TextList,
        }
    }

    fn json_schema(&self) -> Value {
        match self.field_type {
            FieldType::Text => json!({ "type": "string" }),
            FieldType::TextList => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }

    fn shape_hint(&self) -> &'static str {
        match self.field_type {
            FieldType::Text => "\"string\"",
            FieldType::TextList => "[\"string\"]",
        }
    }
}

/// Builder for [`ExtractionSchema`].
///
/// # Example
///
/// ```rust
/// use listing_extractor::SchemaBuilder;
///
/// let schema = SchemaBuilder::from_names(["title", "price"]).build().unwrap();
/// assert_eq!(schema.field_names(), vec!["title", "price", "source"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl SchemaBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from user-supplied field names, all typed as text.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fields: names
                .into_iter()
                .map(|n| FieldSpec::text(n.as_ref()))
                .collect(),
        }
    }

    /// Add a text field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec::text(name));
        self
    }

    /// Add a list-of-strings field.
    pub fn list_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec::text_list(name));
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Names are trimmed. Empty, duplicate and reserved names are rejected.
    pub fn build(self) -> Result<ExtractionSchema, ConfigError> {
        if self.fields.is_empty() {
            return Err(ConfigError::NoFields);
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());

        for (position, spec) in self.fields.into_iter().enumerate() {
            let name = spec.name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::EmptyFieldName { position });
            }
            if name.eq_ignore_ascii_case(SOURCE_FIELD) {
                return Err(ConfigError::ReservedField { name });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateField { name });
            }
            fields.push(FieldSpec {
                name,
                field_type: spec.field_type,
            });
        }

        Ok(ExtractionSchema { fields })
    }
}

/// Target shape for one batch: requested fields plus the implicit `source`.
///
/// Immutable once built; cloning is cheap enough to hand one to every backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSchema {
    fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    /// Requested fields, in order, without `source`.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Every key a record carries: requested fields, then `source`.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(std::iter::once(SOURCE_FIELD))
            .collect()
    }

    /// Requested field names without `source`.
    pub fn requested_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Whether `name` is one of the record keys (including `source`).
    pub fn contains(&self, name: &str) -> bool {
        name == SOURCE_FIELD || self.fields.iter().any(|f| f.name == name)
    }

    /// JSON schema of a single item, as the model must produce it.
    ///
    /// `source` is left out: the model cannot know which URL it is reading.
    pub fn item_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.json_schema()))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.requested_names(),
            "additionalProperties": false,
        })
    }

    /// JSON schema of the whole response: `{"listings": [item, ...]}`.
    pub fn listings_json_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "listings": {
                    "type": "array",
                    "items": self.item_json_schema(),
                }
            },
            "required": ["listings"],
            "additionalProperties": false,
        })
    }

    /// Compact textual shape for prompt-only backends.
    ///
    /// `{"listings": [{"title": "string", "price": "string"}]}`
    pub fn shape_hint(&self) -> String {
        let item = self
            .fields
            .iter()
            .map(|f| format!("\"{}\": {}", f.name, f.shape_hint()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{\"listings\": [{{{}}}]}}", item)
    }
}
