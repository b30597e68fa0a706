//! # Shared Types Crate
//!
//! Wire envelope and connection status types for the esp32m control
//! protocol.
//!
//! ## Wire Format
//!
//! ```text
//! client → device   [{"type":"request","target":"gpio","name":"state-get","seq":17}, ...]
//! device → client   {"type":"response","source":"gpio","name":"state-get","seq":17,"data":{...}}
//! device → client   {"type":"broadcast","source":"wifi","name":"scan","data":{...}}
//! ```
//!
//! ## Design Principles
//!
//! - **Opaque payloads**: `data` and `error` stay `serde_json::Value`; only
//!   the envelope is typed.
//! - **Correlation by `seq` only**: responses may arrive in any order.

pub mod envelope;
pub mod errors;
pub mod status;

pub use envelope::*;
pub use errors::*;
pub use status::*;
