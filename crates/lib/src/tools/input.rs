//! Typed tool input and validation against a tool's declared schema.

use std::fmt;

use serde_json::{Map, Value};

use crate::tools::InputSchema;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("tool input is not valid JSON: {0}")]
    Json(String),
    #[error("tool input must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Arguments of one tool call: a JSON object keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolInput(Map<String, Value>);

impl ToolInput {
    /// Parse the fragment accumulated from `input_json_delta` events. Tools without
    /// parameters stream no fragments at all, so blank input is an empty object.
    pub fn parse(fragment: &str) -> Result<Self, InputError> {
        if fragment.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value =
            serde_json::from_str(fragment).map_err(|e| InputError::Json(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(InputError::NotAnObject(json_type_name(&other))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String parameter; `None` when absent, null, or not a string.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// One way an input fails its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    MissingRequired(String),
    UnknownProperty(String),
    WrongType {
        property: String,
        expected: String,
        found: &'static str,
    },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::MissingRequired(p) => write!(f, "missing required parameter '{}'", p),
            SchemaViolation::UnknownProperty(p) => write!(f, "unknown parameter '{}'", p),
            SchemaViolation::WrongType {
                property,
                expected,
                found,
            } => write!(
                f,
                "parameter '{}' must be {}, got {}",
                property, expected, found
            ),
        }
    }
}

/// Check `input` against `schema`: required properties present, no undeclared properties,
/// declared types respected. A null optional property counts as absent. Returns every
/// violation, in schema order for missing properties and input order for the rest.
pub fn validate_input(schema: &InputSchema, input: &ToolInput) -> Result<(), Vec<SchemaViolation>> {
    let mut violations = Vec::new();
    for name in &schema.required {
        match input.get(name) {
            None | Some(Value::Null) => {
                violations.push(SchemaViolation::MissingRequired(name.clone()))
            }
            Some(_) => {}
        }
    }
    for (name, value) in input.as_map() {
        let Some(prop) = schema.properties.get(name) else {
            violations.push(SchemaViolation::UnknownProperty(name.clone()));
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !matches_type(&prop.kind, value) {
            violations.push(SchemaViolation::WrongType {
                property: name.clone(),
                expected: prop.kind.clone(),
                found: json_type_name(value),
            });
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn matches_type(kind: &str, value: &Value) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Types this subset does not model are not checked.
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDefinition;
    use pretty_assertions::assert_eq;

    fn schema() -> InputSchema {
        ToolDefinition::new("t", "test")
            .param("path", "string", "p", true)
            .param("count", "integer", "c", false)
            .param("force", "boolean", "f", false)
            .input_schema
    }

    #[test]
    fn blank_fragment_is_empty_object() {
        assert_eq!(ToolInput::parse("").unwrap(), ToolInput::default());
        assert_eq!(ToolInput::parse("  \n").unwrap(), ToolInput::default());
    }

    #[test]
    fn parse_rejects_non_objects_and_bad_json() {
        assert_eq!(
            ToolInput::parse("[1,2]").unwrap_err(),
            InputError::NotAnObject("array")
        );
        assert!(matches!(
            ToolInput::parse(r#"{"path": "."#).unwrap_err(),
            InputError::Json(_)
        ));
    }

    #[test]
    fn parse_keeps_value_types() {
        let input = ToolInput::parse(r#"{"path":".","count":3,"force":true}"#).unwrap();
        assert_eq!(input.str("path"), Some("."));
        assert_eq!(input.get("count").and_then(Value::as_i64), Some(3));
        assert_eq!(input.str("count"), None);
    }

    #[test]
    fn valid_input_passes() {
        let input = ToolInput::parse(r#"{"path":"a.txt","count":2,"force":null}"#).unwrap();
        assert_eq!(validate_input(&schema(), &input), Ok(()));
    }

    #[test]
    fn reports_every_violation() {
        let input = ToolInput::parse(r#"{"count":1.5,"force":"yes","extra":1}"#).unwrap();
        let violations = validate_input(&schema(), &input).unwrap_err();
        assert_eq!(
            violations,
            vec![
                SchemaViolation::MissingRequired("path".to_string()),
                SchemaViolation::WrongType {
                    property: "count".to_string(),
                    expected: "integer".to_string(),
                    found: "number",
                },
                SchemaViolation::WrongType {
                    property: "force".to_string(),
                    expected: "boolean".to_string(),
                    found: "string",
                },
                SchemaViolation::UnknownProperty("extra".to_string()),
            ]
        );
        assert_eq!(
            violations[0].to_string(),
            "missing required parameter 'path'"
        );
    }

    #[test]
    fn null_required_is_missing() {
        let input = ToolInput::parse(r#"{"path":null}"#).unwrap();
        assert_eq!(
            validate_input(&schema(), &input),
            Err(vec![SchemaViolation::MissingRequired("path".to_string())])
        );
    }
}
