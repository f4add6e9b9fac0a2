//! Argument validation against a tool's declared JSON Schema.
//!
//! Covers the subset tool schemas use: `type`, `required`, `enum`,
//! `minimum`/`maximum`, `minLength`/`maxLength`, `minItems`/`maxItems`,
//! `items`, `additionalProperties: false` and the `date-time`, `email` and
//! `uuid` formats. Optional fields sent as `null` count as absent.

use chrono::DateTime;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::FieldError;

/// Check `args` against `schema`, collecting every field-level failure.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    let Some(object) = args.as_object() else {
        errors.push(FieldError::new("$", "arguments must be a JSON object"));
        return Err(errors);
    };

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if object.get(name).is_none_or(Value::is_null) {
                errors.push(FieldError::new(name, "is required"));
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (name, value) in object {
        match properties.get(name) {
            Some(_) if value.is_null() => {}
            Some(property) => validate_value(name, property, value, &mut errors),
            None if closed => errors.push(FieldError::new(name, "is not a recognised field")),
            None => {}
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validate_value(path: &str, schema: &Value, value: &Value, errors: &mut Vec<FieldError>) {
    if let Some(expected) = schema.get("type").and_then(Value::as_str)
        && !matches_type(expected, value)
    {
        errors.push(FieldError::new(path, format!("must be of type {}", expected)));
        return;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array)
        && !allowed.contains(value)
    {
        let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        errors.push(FieldError::new(
            path,
            format!("must be one of {}", options.join(", ")),
        ));
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
            && n < min
        {
            errors.push(FieldError::new(path, format!("must be at least {}", min)));
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
            && n > max
        {
            errors.push(FieldError::new(path, format!("must be at most {}", max)));
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
            && len < min
        {
            errors.push(FieldError::new(
                path,
                format!("must be at least {} characters", min),
            ));
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
            && len > max
        {
            errors.push(FieldError::new(
                path,
                format!("must be at most {} characters", max),
            ));
        }
        if let Some(format) = schema.get("format").and_then(Value::as_str)
            && let Err(message) = check_format(format, s)
        {
            errors.push(FieldError::new(path, message));
        }
    }

    if let Some(items) = value.as_array() {
        let len = items.len() as u64;
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
            && len < min
        {
            errors.push(FieldError::new(path, format!("must have at least {} items", min)));
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
            && len > max
        {
            errors.push(FieldError::new(path, format!("must have at most {} items", max)));
        }
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                validate_value(&format!("{}[{}]", path, i), item_schema, item, errors);
            }
        }
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
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

fn check_format(format: &str, s: &str) -> Result<(), String> {
    match format {
        "date-time" => DateTime::parse_from_rfc3339(s)
            .map(|_| ())
            .map_err(|_| "must be an RFC 3339 date-time, e.g. 2025-06-02T14:00:00Z".to_string()),
        "email" => {
            let s = s.trim();
            match s.split_once('@') {
                Some((local, domain))
                    if !local.is_empty()
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                        && !s.contains(char::is_whitespace) =>
                {
                    Ok(())
                }
                _ => Err("must be a valid email address".to_string()),
            }
        }
        "uuid" => Uuid::parse_str(s)
            .map(|_| ())
            .map_err(|_| "must be a valid identifier".to_string()),
        _ => Ok(()),
    }
}
