//! Transport Layer - Envelope Stream Abstractions
//!
//! A transport is a bidirectional envelope-framed byte channel. The channel
//! owns exactly one transport; once a session is established only the
//! channel's background workers touch it, so every method takes `&self` and
//! implementations manage their own interior mutability.
//!
//! Concrete sockets (TCP, WebSocket) are external collaborators plugged in
//! through [`Transport`], [`TransportFactory`] and [`TransportListener`].
//! Two implementations ship here: the in-process [`pair::PairTransport`]
//! and [`stream::StreamTransport`], which frames envelopes over any byte
//! stream.

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use thiserror::Error;

// Layer 3: Internal module imports
use crate::protocol::{Envelope, SessionCompression, SessionEncryption};

pub mod pair;
pub mod stream;

pub use pair::{PairConnector, PairListener, PairTransport};
pub use stream::{EnvelopeCodec, StreamTransport};

/// Transport error types
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was closed while the operation was in flight
    #[error("transport is closed")]
    Closed,

    /// The operation requires an open transport
    #[error("transport is not open")]
    NotOpen,

    /// A deadline expired before the operation completed
    #[error("transport operation timed out")]
    Timeout,

    /// The transport does not support the requested stream option
    #[error("unsupported transport option: {option}")]
    UnsupportedOption { option: String },

    /// Underlying stream fault
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Envelope encode/decode failure at the framing layer
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl TransportError {
    /// Create an unsupported-option error
    pub fn unsupported_option(option: impl Into<String>) -> Self {
        Self::UnsupportedOption {
            option: option.into(),
        }
    }
}

/// A bidirectional envelope stream.
///
/// `set_compression` and `set_encryption` reconfigure the stream in place
/// and are called only between the negotiation confirmation and the first
/// post-negotiation envelope.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Encode and transmit one envelope atomically
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Read the next envelope from the stream
    async fn receive(&self) -> Result<Envelope, TransportError>;

    /// Close the transport. The first close succeeds; subsequent calls
    /// return [`TransportError::NotOpen`].
    async fn close(&self) -> Result<(), TransportError>;

    /// True while the transport can send and receive
    fn is_connected(&self) -> bool;

    /// Compression algorithms this transport can apply
    fn supported_compression(&self) -> Vec<SessionCompression>;

    /// Encryption algorithms this transport can apply
    fn supported_encryption(&self) -> Vec<SessionEncryption>;

    /// The compression currently applied to the stream
    fn compression(&self) -> SessionCompression;

    /// The encryption currently applied to the stream
    fn encryption(&self) -> SessionEncryption;

    /// Reconfigure the stream to use the given compression
    async fn set_compression(&self, compression: SessionCompression)
        -> Result<(), TransportError>;

    /// Reconfigure the stream to use the given encryption
    async fn set_encryption(&self, encryption: SessionEncryption) -> Result<(), TransportError>;
}

/// Dials new transports for the supervised client
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a fresh transport towards the server
    async fn dial(&self) -> Result<Box<dyn Transport>, TransportError>;
}

/// Accepts inbound transports for the server
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Wait for the next inbound transport
    async fn accept(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Stop accepting; pending and future `accept` calls fail
    async fn close(&self) -> Result<(), TransportError>;
}
