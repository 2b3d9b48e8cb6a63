//! Parameter checking against the JSON schema declared by each tool, plus
//! small accessors the systems use to pull typed values out of parameters.
use serde_json::{Map, Value};

use crate::errors::{AgentError, AgentResult};

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Check `params` against an object schema of the form
/// `{"type": "object", "properties": {..}, "required": [..]}`
pub fn validate(schema: &Value, params: &Value) -> AgentResult<()> {
    let empty = Map::new();
    let params = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(AgentError::InvalidParameters(format!(
                "parameters must be an object, got {}",
                other
            )))
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match params.get(name) {
                None | Some(Value::Null) => {
                    return Err(AgentError::InvalidParameters(format!(
                        "missing required parameter '{}'",
                        name
                    )))
                }
                Some(_) => {}
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in params {
        // Unknown and null parameters are tolerated; models often send both
        let Some(property) = properties.get(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                return Err(AgentError::InvalidParameters(format!(
                    "parameter '{}' must be of type {}",
                    name, expected
                )));
            }
        }
        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(AgentError::InvalidParameters(format!(
                    "parameter '{}' must be one of {}",
                    name,
                    Value::Array(allowed.clone())
                )));
            }
        }
    }
    Ok(())
}

pub fn required_str<'a>(params: &'a Value, name: &str) -> AgentResult<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing '{}' parameter", name)))
}

pub fn optional_str<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

pub fn optional_bool(params: &Value, name: &str) -> Option<bool> {
    params.get(name).and_then(Value::as_bool)
}

pub fn optional_u64(params: &Value, name: &str) -> Option<u64> {
    params.get(name).and_then(Value::as_u64)
}

/// Accepts either an array of strings or a single whitespace separated string
pub fn string_list(params: &Value, name: &str) -> Vec<String> {
    match params.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(String::from).collect(),
        _ => Vec::new(),
    }
}
