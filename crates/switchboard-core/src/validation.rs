//! Argument validation against a tool's declared parameter schema.
//!
//! Covers the JSON-Schema subset services actually declare: an `object`
//! root, `required` fields, and per-property `type`. A tool with no schema
//! passes trivially.

use serde_json::{Map, Value};
use std::fmt;

/// One reason an argument map was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// The offending field, or `"$"` for the root.
    pub field: String,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationFailure {
    /// Create a failure for a named field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate an argument map against an optional parameter schema.
///
/// Returns every failure found, not just the first.
pub fn validate_arguments(
    arguments: &Map<String, Value>,
    schema: Option<&Value>,
) -> Result<(), Vec<ValidationFailure>> {
    let Some(schema) = schema else {
        return Ok(());
    };
    let Some(schema) = schema.as_object() else {
        // A malformed schema must not block the call.
        return Ok(());
    };

    let mut failures = Vec::new();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(field) {
                failures.push(ValidationFailure::new(field, "missing required field"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, value) in arguments {
            let Some(declared) = properties.get(field) else {
                continue;
            };
            let Some(expected) = declared.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                failures.push(ValidationFailure::new(
                    field,
                    format!("expected {expected}, got {}", json_type_name(value)),
                ));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are accepted rather than rejected.
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "limit": { "type": "integer" },
                "follow": { "type": "boolean" }
            },
            "required": ["path"]
        })
    }

    #[test]
    fn no_schema_passes_trivially() {
        let arguments = args(json!({"anything": 1}));
        assert!(validate_arguments(&arguments, None).is_ok());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let arguments = args(json!({"limit": 10}));
        let failures = validate_arguments(&arguments, Some(&schema())).unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "path");
    }

    #[test]
    fn wrong_types_are_all_reported() {
        let arguments = args(json!({"path": 42, "limit": "ten", "follow": true}));
        let failures = validate_arguments(&arguments, Some(&schema())).unwrap_err();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|f| f.field == "path"));
        assert!(failures.iter().any(|f| f.field == "limit"));
    }

    #[test]
    fn extra_fields_are_not_rejected() {
        let arguments = args(json!({"path": "/tmp/x", "unknown": []}));
        assert!(validate_arguments(&arguments, Some(&schema())).is_ok());
    }

    #[test]
    fn integer_accepts_whole_numbers_only() {
        let arguments = args(json!({"path": "/tmp/x", "limit": 1.5}));
        let failures = validate_arguments(&arguments, Some(&schema())).unwrap_err();
        assert_eq!(failures[0].field, "limit");
    }

    #[test]
    fn malformed_schema_does_not_block_calls() {
        let arguments = args(json!({"path": "/tmp/x"}));
        assert!(validate_arguments(&arguments, Some(&json!("not a schema"))).is_ok());
    }
}
