//! Schema-driven input validation.
//!
//! A [`SchemaValidator`] is compiled once from a tool's advertised JSON
//! Schema and then applied to every invocation. The schema is open: fields
//! not mentioned in `properties` are always permitted. Absent or malformed
//! schemas fall back to a permissive validator that accepts any object.

use serde_json::Value;
use thiserror::Error;

/// Error type for input validation failures.
///
/// Messages are written for an LLM caller: they name the field and say how
/// to fix the problem.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The arguments were not a JSON object.
    #[error("arguments must be an object, got {actual}")]
    NotAnObject {
        /// What was received instead.
        actual: String,
    },

    /// A required field is missing.
    #[error("missing required field '{name}'")]
    MissingRequired {
        /// The field name.
        name: String,
    },

    /// A field has the wrong type.
    #[error("invalid type for '{name}': expected {expected}, got {actual}")]
    InvalidType {
        /// The field name.
        name: String,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        actual: String,
    },

    /// Multiple validation errors.
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Typed field kinds mapped from JSON Schema `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `string`
    Text,
    /// `integer`
    Integer,
    /// `number`
    Real,
    /// `boolean`
    Bool,
    /// `array`
    Sequence,
    /// `object`
    Map,
}

impl FieldType {
    /// Map a JSON Schema type name. Unknown types default to text.
    fn from_schema_type(name: &str) -> Self {
        match name {
            "integer" => Self::Integer,
            "number" => Self::Real,
            "boolean" => Self::Bool,
            "array" => Self::Sequence,
            "object" => Self::Map,
            _ => Self::Text,
        }
    }

    fn expected_name(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Real => "number",
            Self::Bool => "boolean",
            Self::Sequence => "array",
            Self::Map => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Real => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Sequence => value.is_array(),
            Self::Map => value.is_object(),
        }
    }
}

/// One typed field derived from the schema's `properties`.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: FieldType,
    /// Whether the field is listed in `required`.
    pub required: bool,
}

/// Compiled validator for one tool's input.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    fields: Vec<FieldSpec>,
}

impl SchemaValidator {
    /// A validator that accepts any object.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Compile a validator from an advertised schema.
    ///
    /// `None`, non-object, or otherwise malformed schemas yield the
    /// permissive validator; the fallback is logged but never fails
    /// registration.
    pub fn from_schema(schema: Option<&Value>) -> Self {
        let Some(schema) = schema else {
            return Self::permissive();
        };
        let Some(schema) = schema.as_object() else {
            tracing::warn!("tool schema is not an object, using permissive validation");
            return Self::permissive();
        };

        let required: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let properties = match schema.get("properties") {
            Some(Value::Object(props)) => props,
            Some(_) => {
                tracing::warn!("schema 'properties' is not an object, using permissive validation");
                return Self::permissive();
            }
            None => return Self::permissive(),
        };

        let fields = properties
            .iter()
            .map(|(name, field_schema)| {
                let ty = field_schema
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(FieldType::from_schema_type)
                    .unwrap_or(FieldType::Text);
                FieldSpec {
                    name: name.clone(),
                    ty,
                    required: required.contains(&name.as_str()),
                }
            })
            .collect();

        Self { fields }
    }

    /// The compiled field specs.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Whether this validator only checks object-ness.
    pub fn is_permissive(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate arguments against the compiled fields.
    ///
    /// Extra fields are permitted; required fields must be present; present
    /// fields must match their declared type. All violations are collected
    /// into one error.
    pub fn validate(&self, arguments: &Value) -> Result<(), ValidationError> {
        let Some(object) = arguments.as_object() else {
            return Err(ValidationError::NotAnObject {
                actual: json_type_name(arguments).to_string(),
            });
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(ValidationError::MissingRequired {
                            name: field.name.clone(),
                        });
                    }
                }
                Some(value) => {
                    if !field.ty.matches(value) {
                        errors.push(ValidationError::InvalidType {
                            name: field.name.clone(),
                            expected: field.ty.expected_name(),
                            actual: json_type_name(value).to_string(),
                        });
                    }
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.into_iter().next().unwrap()),
            _ => Err(ValidationError::Multiple(errors)),
        }
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

    fn path_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "limit": {"type": "integer"},
                "recursive": {"type": "boolean"}
            },
            "required": ["path"]
        })
    }

    #[test]
    fn test_valid_arguments() {
        let validator = SchemaValidator::from_schema(Some(&path_schema()));
        assert!(!validator.is_permissive());
        validator
            .validate(&json!({"path": "/tmp", "limit": 10, "recursive": true}))
            .unwrap();
    }

    #[test]
    fn test_missing_required() {
        let validator = SchemaValidator::from_schema(Some(&path_schema()));
        let err = validator.validate(&json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequired { ref name } if name == "path"));
    }

    #[test]
    fn test_wrong_type() {
        let validator = SchemaValidator::from_schema(Some(&path_schema()));
        let err = validator
            .validate(&json!({"path": "/tmp", "limit": "ten"}))
            .unwrap_err();
        match err {
            ValidationError::InvalidType { name, expected, actual } => {
                assert_eq!(name, "limit");
                assert_eq!(expected, "integer");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_errors_collected() {
        let validator = SchemaValidator::from_schema(Some(&path_schema()));
        let err = validator
            .validate(&json!({"limit": "ten", "recursive": 3}))
            .unwrap_err();
        match err {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn test_extra_fields_permitted() {
        let validator = SchemaValidator::from_schema(Some(&path_schema()));
        validator
            .validate(&json!({"path": "/tmp", "unexpected": [1, 2, 3]}))
            .unwrap();
    }

    #[test]
    fn test_optional_null_treated_as_absent() {
        let validator = SchemaValidator::from_schema(Some(&path_schema()));
        validator
            .validate(&json!({"path": "/tmp", "limit": null}))
            .unwrap();
    }

    #[test]
    fn test_absent_schema_is_permissive() {
        let validator = SchemaValidator::from_schema(None);
        assert!(validator.is_permissive());
        validator.validate(&json!({"anything": "goes"})).unwrap();
    }

    #[test]
    fn test_malformed_schema_falls_back() {
        let validator = SchemaValidator::from_schema(Some(&json!("not a schema")));
        assert!(validator.is_permissive());
        let validator = SchemaValidator::from_schema(Some(&json!({"properties": 42})));
        assert!(validator.is_permissive());
    }

    #[test]
    fn test_non_object_arguments_rejected_even_permissive() {
        let validator = SchemaValidator::permissive();
        let err = validator.validate(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject { .. }));
    }

    #[test]
    fn test_unknown_type_defaults_to_text() {
        let schema = json!({
            "type": "object",
            "properties": {"weird": {"type": "uuid"}}
        });
        let validator = SchemaValidator::from_schema(Some(&schema));
        validator.validate(&json!({"weird": "some-string"})).unwrap();
        let err = validator.validate(&json!({"weird": 42})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidType { .. }));
    }

    #[test]
    fn test_number_accepts_integer() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "number"}}
        });
        let validator = SchemaValidator::from_schema(Some(&schema));
        validator.validate(&json!({"a": 5})).unwrap();
        validator.validate(&json!({"a": 5.5})).unwrap();
    }
}
