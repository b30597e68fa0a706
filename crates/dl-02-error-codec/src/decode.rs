//! Wire error decoding.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{DeviceError, ErrorCode, ServerError};
use crate::registry::ErrorRegistry;

/// Decode the `error` field of a response.
///
/// Never fails: shapes that carry nothing usable become a
/// `"general failure"` error. An array of arrays decodes as a composite,
/// unless it holds exactly one error.
pub fn decode(value: &Value, registry: &ErrorRegistry) -> ServerError {
    match value {
        Value::Array(items) if items.first().is_some_and(Value::is_array) => {
            let mut errors: Vec<DeviceError> = items
                .iter()
                .flat_map(|item| match decode(item, registry) {
                    ServerError::Device(e) => vec![e],
                    ServerError::Composite(es) => es,
                })
                .collect();
            if errors.len() == 1 {
                ServerError::Device(errors.remove(0))
            } else {
                ServerError::Composite(errors)
            }
        }
        other => ServerError::Device(decode_single(other, registry)),
    }
}

fn decode_single(value: &Value, registry: &ErrorRegistry) -> DeviceError {
    let (code, message, args) = match value {
        Value::Number(_) => (code_of(value), None, None),
        Value::String(s) => (None, Some(s.clone()), None),
        Value::Array(items) => (
            items.first().and_then(code_of),
            items.get(1).and_then(Value::as_str).map(str::to_string),
            None,
        ),
        Value::Object(fields) => (
            fields.get("code").and_then(code_of),
            fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            fields.get("args").and_then(Value::as_object).cloned(),
        ),
        _ => {
            trace!(error = %value, "Unrecognized error shape");
            (None, None, None::<Map<String, Value>>)
        }
    };

    let code_name = code.as_ref().map(|c| registry.resolve(c));
    DeviceError::new(code, code_name, message, args)
}

fn code_of(value: &Value) -> Option<ErrorCode> {
    match value {
        Value::Number(n) => n.as_i64().map(ErrorCode::Number),
        Value::String(s) if !s.is_empty() => Some(ErrorCode::Name(s.clone())),
        _ => None,
    }
}
