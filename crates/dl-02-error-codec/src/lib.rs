//! # DL-02 Error Codec
//!
//! Turns the error field of a device response into a structured error.
//!
//! Modules report failures in several shapes:
//!
//! | Wire shape | Decoded as |
//! |------------|------------|
//! | `258` | `{code: 258}` |
//! | `"bad pin"` | `{message: "bad pin"}` |
//! | `[258, "bad pin"]` | `{code: 258, message: "bad pin"}` |
//! | `[[258, "a"], [259, "b"]]` | composite of two errors |
//! | `{"code": 258, "message": "...", "args": {...}}` | fields taken as-is |
//!
//! Numeric codes are named through an [`ErrorRegistry`] merged from any
//! number of [`ErrorNameProvider`]s; unknown codes get a hexadecimal label
//! such as `ESP_ERR_0x04d2`.
//!
//! ```ignore
//! use dl_02_error_codec::{decode, ErrorRegistry};
//!
//! let registry = ErrorRegistry::esp_idf();
//! let error = decode(&serde_json::json!([258, "pin 40 does not exist"]), &registry);
//! assert_eq!(error.to_string(), "ESP_ERR_INVALID_ARG pin 40 does not exist");
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod decode;
pub mod error;
pub mod registry;

pub use decode::decode;
pub use error::{DeviceError, ErrorCode, ServerError, ESP_ERROR_NAME, GENERAL_FAILURE};
pub use registry::{ErrorNameProvider, ErrorRegistry, EspIdfErrors, StaticErrorNames};
