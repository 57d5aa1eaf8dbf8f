//! Error types for envelope parsing and wire-format handling.

// Layer 2: Third-party crate imports
use thiserror::Error;

/// Errors produced while parsing or serializing protocol data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Media type string does not match `type/subtype(+suffix)?`
    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    /// URI is absolute but does not use the `lime` scheme, or is unparseable
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// Raw envelope carries no discriminator field, or an inconsistent set
    #[error("invalid envelope: {message}")]
    InvalidEnvelope { message: String },

    /// Authentication payload does not match its scheme
    #[error("invalid authentication payload for scheme '{scheme}'")]
    InvalidAuthentication { scheme: String },

    /// JSON serialization or deserialization failure
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Convenient result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ProtocolError {
    /// Create an invalid envelope error
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
