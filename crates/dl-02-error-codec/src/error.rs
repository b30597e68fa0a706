//! Structured device errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Type tag written into serialized device errors.
pub const ESP_ERROR_NAME: &str = "EspError";

/// Message used when the device gave neither a message nor a code.
pub const GENERAL_FAILURE: &str = "general failure";

/// Error code exactly as the device sent it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Name(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Number(n) => write!(f, "{}", n),
            ErrorCode::Name(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(n: i64) -> Self {
        ErrorCode::Number(n)
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        ErrorCode::Name(s.to_string())
    }
}

/// One failure reported by a device module.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceError {
    /// Raw code from the wire
    pub code: Option<ErrorCode>,
    /// Resolved symbolic name of `code`
    pub code_name: Option<String>,
    /// Human-readable message; never empty
    pub message: String,
    /// Interpolation arguments for localized messages
    pub args: Option<Map<String, Value>>,
}

impl DeviceError {
    /// Build an error, applying the message fallbacks (message, then code
    /// name, then [`GENERAL_FAILURE`]).
    pub fn new(
        code: Option<ErrorCode>,
        code_name: Option<String>,
        message: Option<String>,
        args: Option<Map<String, Value>>,
    ) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .or_else(|| code_name.clone())
            .unwrap_or_else(|| GENERAL_FAILURE.to_string());
        Self {
            code,
            code_name,
            message,
            args,
        }
    }

    /// An error with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(None, None, Some(message.into()), None)
    }

    /// Numeric code, if the device sent one.
    pub fn numeric_code(&self) -> Option<i64> {
        match self.code {
            Some(ErrorCode::Number(n)) => Some(n),
            _ => None,
        }
    }

    /// Serialize to the tagged form consumers store and later localize.
    pub fn to_serial(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rebuild an error from [`DeviceError::to_serial`] output. Returns
    /// `None` for values not tagged as device errors.
    pub fn from_serial(value: &Value) -> Option<Self> {
        if value.get("name").and_then(Value::as_str) != Some(ESP_ERROR_NAME) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code_name {
            Some(name) if name != &self.message => write!(f, "{} {}", name, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DeviceError {}

impl Serialize for DeviceError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DeviceError", 5)?;
        state.serialize_field("name", ESP_ERROR_NAME)?;
        if let Some(ref code) = self.code {
            state.serialize_field("code", code)?;
        }
        if let Some(ref code_name) = self.code_name {
            state.serialize_field("codeName", code_name)?;
        }
        state.serialize_field("message", &self.message)?;
        if let Some(ref args) = self.args {
            state.serialize_field("args", args)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for DeviceError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ErrorHelper {
            code: Option<ErrorCode>,
            code_name: Option<String>,
            message: Option<String>,
            args: Option<Map<String, Value>>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        Ok(DeviceError::new(
            helper.code,
            helper.code_name,
            helper.message,
            helper.args,
        ))
    }
}

/// Decoded `error` field of a response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServerError {
    /// A single failure
    #[error("{0}")]
    Device(DeviceError),

    /// Several failures reported together
    #[error("{}", join_errors(.0))]
    Composite(Vec<DeviceError>),
}

fn join_errors(errors: &[DeviceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ServerError {
    /// Every individual failure, in wire order.
    pub fn errors(&self) -> &[DeviceError] {
        match self {
            ServerError::Device(error) => std::slice::from_ref(error),
            ServerError::Composite(errors) => errors,
        }
    }

    /// The single error, if this is not a composite.
    pub fn as_device(&self) -> Option<&DeviceError> {
        match self {
            ServerError::Device(error) => Some(error),
            ServerError::Composite(_) => None,
        }
    }

    /// Serialized form: one tagged object, or an array of them.
    pub fn to_serial(&self) -> Value {
        match self {
            ServerError::Device(error) => error.to_serial(),
            ServerError::Composite(errors) => {
                Value::Array(errors.iter().map(DeviceError::to_serial).collect())
            }
        }
    }
}

impl From<DeviceError> for ServerError {
    fn from(error: DeviceError) -> Self {
        ServerError::Device(error)
    }
}
