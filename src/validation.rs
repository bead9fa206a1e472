//! Input validation for tool routes.
//!
//! Routes may attach a JSON-schema subset to describe expected input. The
//! checker covers the shapes manifests actually use: `type`, `properties`,
//! `required`, and `items`. Shell-bound inputs additionally pass through
//! [`sanitize_code`] before substitution.

use serde_json::Value;

use crate::error::{RicaError, RicaResult};

const DEFAULT_MAX_CODE_LEN: usize = 1000;

const DANGEROUS_PATTERNS: &[&str] = &["__import__", "exec", "eval", "compile", "open"];

/// Check `data` against a JSON-schema subset.
///
/// Supported keywords: `type` (object, array, string, number, integer,
/// boolean, null), `properties`, `required`, `items`. Unknown keywords are
/// ignored, matching permissive schema validation.
pub fn validate_input(schema: &Value, data: &Value) -> bool {
    if let Some(type_name) = schema.get("type").and_then(|v| v.as_str()) {
        let type_ok = match type_name {
            "object" => data.is_object(),
            "array" => data.is_array(),
            "string" => data.is_string(),
            "number" => data.is_number(),
            "integer" => data.is_i64() || data.is_u64(),
            "boolean" => data.is_boolean(),
            "null" => data.is_null(),
            _ => true,
        };
        if !type_ok {
            return false;
        }
    }

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        let Some(object) = data.as_object() else {
            return false;
        };
        for key in required {
            match key.as_str() {
                Some(key) if object.contains_key(key) => {}
                _ => return false,
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        if let Some(object) = data.as_object() {
            for (key, sub_schema) in properties {
                if let Some(value) = object.get(key) {
                    if !validate_input(sub_schema, value) {
                        return false;
                    }
                }
            }
        }
    }

    if let Some(items) = schema.get("items") {
        if let Some(array) = data.as_array() {
            for item in array {
                if !validate_input(items, item) {
                    return false;
                }
            }
        }
    }

    true
}

/// Trim, length-limit, and screen code destined for an interpreter.
pub fn sanitize_code(code: &str, max_length: Option<usize>) -> RicaResult<String> {
    let max_length = max_length.unwrap_or(DEFAULT_MAX_CODE_LEN);
    let code = code.trim();

    if code.len() > max_length {
        return Err(RicaError::Validation(format!(
            "code exceeds max length of {max_length}"
        )));
    }

    for pattern in DANGEROUS_PATTERNS {
        if code.contains(pattern) {
            return Err(RicaError::Validation(format!(
                "dangerous pattern '{pattern}' detected"
            )));
        }
    }

    Ok(code.to_string())
}
