//! # Error Types
//!
//! Errors raised while classifying inbound frames.

use thiserror::Error;

/// Why an inbound frame could not be turned into a [`crate::Message`].
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Frame is not valid JSON.
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has no `type` field.
    #[error("Frame has no type tag")]
    MissingType,

    /// Frame has a `type` field that is not a string.
    #[error("Frame type tag is not a string")]
    NonStringType,
}
