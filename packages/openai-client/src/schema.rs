//! JSON schema preparation for strict structured outputs.
//!
//! OpenAI's strict mode requires:
//! 1. `additionalProperties: false` on every object schema
//! 2. every property listed in `required`, even nullable ones
//! 3. fully inlined schemas (no `$ref`)
//!
//! [`strict_schema`] applies those rules to any schema value, whether it was
//! generated by `schemars` or assembled by hand at run time.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Trait for types that can be used as structured output.
///
/// Automatically implemented for any type that implements `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Strict-mode schema for this type.
    fn openai_schema() -> Value {
        let schema = serde_json::to_value(schema_for!(Self)).unwrap_or_default();
        strict_schema(schema)
    }

    /// Get the schema name for this type.
    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Rewrite a JSON schema so strict structured-output endpoints accept it.
pub fn strict_schema(mut schema: Value) -> Value {
    close_objects(&mut schema);

    if let Some(definitions) = schema.get("definitions").cloned() {
        inline_refs(&mut schema, &definitions);
    }

    if let Value::Object(map) = &mut schema {
        map.remove("definitions");
        map.remove("$schema");
    }

    schema
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                let keys: Option<Vec<Value>> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect());
                if let Some(keys) = keys {
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }

            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();

            if let Some(def) = target {
                *value = def;
                inline_refs(value, definitions);
                return;
            }

            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}
