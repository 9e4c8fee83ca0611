//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] and reports problems
//! as diagnostics. This is what the default Check of an inferred resource runs
//! before decoding inputs into the resource's typed arguments.
//!
//! # Example
//!
//! ```
//! use linux_provider::schema::{Attribute, Schema};
//! use linux_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute("path", Attribute::required_string());
//!
//! assert!(validate(&schema, &json!({"path": "/tmp/x"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"path": 7}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("path".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics; an empty list means the value is valid.
///
/// # Validation Rules
///
/// - The value must be an object (null is treated as an empty object)
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Keys not declared in the schema produce a warning
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let empty = serde_json::Map::new();
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    for key in obj.keys() {
        if !schema.attributes.contains_key(key) {
            diagnostics.push(
                Diagnostic::warning(format!("Unknown attribute '{}'", key))
                    .with_detail("This attribute is not part of the schema and will be ignored")
                    .with_attribute(key.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
///
/// Only error diagnostics make the result an `Err`; warnings are dropped.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let errors: Vec<_> = validate(schema, value)
        .into_iter()
        .filter(Diagnostic::is_error)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate_result(schema, value).is_ok()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_output_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeFlags, DiagnosticSeverity};
    use serde_json::json;

    fn file_schema() -> Schema {
        Schema::v0()
            .with_attribute("path", Attribute::required_string())
            .with_attribute("result", Attribute::computed_string())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = file_schema();

        assert!(validate(&schema, &json!({"path": "/tmp/x"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("path".to_string()));

        let diagnostics = validate(&schema, &json!({"path": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"path": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_null_root_is_empty_object() {
        let diagnostics = validate(&file_schema(), &Value::Null);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required attribute"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = file_schema();
        let diagnostics = validate(&schema, &json!({"path": "/tmp/x", "result": 5}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_attribute_warns() {
        let diagnostics = validate(&file_schema(), &json!({"path": "/tmp/x", "mode": 420}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert_eq!(diagnostics[0].attribute, Some("mode".to_string()));

        assert!(is_valid(&file_schema(), &json!({"path": "/tmp/x", "mode": 420})));
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("mode", Attribute::optional_int64());

        assert!(validate(&schema, &json!({"mode": 420})).is_empty());
        assert!(validate(&schema, &json!({"mode": 420.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"mode": 4.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"mode": "420"})).len(), 1);
    }

    #[test]
    fn test_validate_list_and_map() {
        let schema = Schema::v0()
            .with_attribute(
                "lines",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute(
                "labels",
                Attribute::new(
                    AttributeType::map(AttributeType::Bool),
                    AttributeFlags::optional(),
                ),
            );

        assert!(validate(&schema, &json!({"lines": ["a"], "labels": {"x": true}})).is_empty());

        let diagnostics = validate(&schema, &json!({"lines": ["a", 1]}));
        assert_eq!(diagnostics[0].attribute, Some("lines.1".to_string()));

        let diagnostics = validate(&schema, &json!({"labels": {"x": "yes"}}));
        assert_eq!(diagnostics[0].attribute, Some("labels.x".to_string()));

        let diagnostics = validate(&schema, &json!({"lines": "a"}));
        assert!(diagnostics[0].detail.as_deref().unwrap().contains("Expected list"));
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = file_schema();

        assert!(validate_result(&schema, &json!({"path": "/tmp/x"})).is_ok());

        let result = validate_result(&schema, &json!({}));
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let diagnostics = validate(&file_schema(), &json!("/tmp/x"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }
}
