//! Output validation against a module's schema fragment
//!
//! Checks are top-level only: the output must be an object, every required
//! field must be present and non-null, and fields declared in the schema's
//! `properties` with a `type` must match it. Unknown extra fields pass.

use folio_domain::Module;
use serde_json::{Map, Value};

/// Validate a parsed response for `module`, returning the output object
pub fn validate_output(value: Value, module: &Module) -> Result<Map<String, Value>, String> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))
        }
    };

    for field in module.required_fields() {
        match object.get(&field) {
            None | Some(Value::Null) => {
                return Err(format!("missing required field '{}'", field));
            }
            Some(_) => {}
        }
    }

    if let Some(properties) = module.schema.get("properties").and_then(Value::as_object) {
        for (field, spec) in properties {
            let Some(value) = object.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(expected) = spec.get("type") {
                if !type_matches(value, expected) {
                    return Err(format!(
                        "field '{}' should be {}, got {}",
                        field,
                        expected,
                        type_name(value)
                    ));
                }
            }
        }
    }

    Ok(object)
}

fn type_matches(value: &Value, expected: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(value, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(value, name)),
        _ => true,
    }
}

fn single_type_matches(value: &Value, name: &str) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
