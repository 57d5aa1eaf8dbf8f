//! LIME - Lightweight and Interoperable Messaging Extensions
//!
//! This crate implements the LIME protocol: JSON envelopes exchanged over a
//! full-duplex stream between named network nodes, with session negotiation
//! (compression, encryption), identity authentication, and a
//! request/response command facility.
//!
//! # Architecture
//!
//! The implementation is organized in layers:
//!
//! - **Protocol Layer** (`protocol`): the four envelope families, node and
//!   media-type grammars, typed documents and the JSON wire format
//! - **Authentication** (`authentication`): scheme-tagged credential
//!   payloads and verification results
//! - **Transport Layer** (`transport`): the envelope stream abstraction and
//!   the in-process pair transport
//! - **Channel Layer** (`channel`): the session state machine, typed
//!   queues, background I/O workers and request/response correlation
//! - **Session Layer** (`session`): the client- and server-role
//!   establishment handshake
//! - **Mux Layer** (`mux`): predicate-dispatched envelope handlers
//! - **Client / Server** (`client`, `server`): the supervised client and
//!   the listener fan-in server
//!
//! # Quick Start
//!
//! ```rust
//! use lime::protocol::{Command, CommandMethod, Envelope, LimeUri};
//!
//! // Build a ping request and inspect its wire form
//! let request = Command::new_request(CommandMethod::Get, LimeUri::ping());
//! let json = Envelope::Command(request).to_json().unwrap();
//! assert!(json.contains(r#""method":"get""#));
//! assert!(json.contains(r#""uri":"/ping""#));
//! ```
//!
//! # Session Lifecycle
//!
//! A [`channel::Channel`] is created from a transport in the `new` state.
//! The establishment procedure advances it through `negotiating` and/or
//! `authenticating` to `established`, at which point the background I/O
//! workers start and application envelopes flow. The session terminates in
//! `finished` (graceful) or `failed` (either side aborts); the typed
//! queues then signal EOF to their consumers.

// Protocol layer modules
pub mod protocol;

// Authentication payloads
pub mod authentication;

// Transport layer modules
pub mod transport;

// Channel layer modules
pub mod channel;

// Session establishment modules
pub mod session;

// Envelope multiplexer modules
pub mod mux;

// Supervised client and server
pub mod client;
pub mod server;

// Re-export commonly used types for convenience
pub use authentication::{
    Authentication, AuthenticationResult, AuthenticationScheme, DomainRole,
};
pub use channel::{Channel, ChannelConfig, ChannelError, ChannelResult};
pub use client::{Client, ClientBuilder, ClientConfig, ClientError, ClientResult};
pub use mux::{EnvelopeMux, EnvelopeSender};
pub use protocol::{
    Command, CommandMethod, CommandStatus, Document, DocumentContent, Envelope, EnvelopeHeader,
    Identity, LimeUri, MediaType, Message, Node, Notification, NotificationEvent, ProtocolError,
    ProtocolResult, Reason, Session, SessionCompression, SessionEncryption, SessionState,
};
pub use server::{Server, ServerBuilder, ServerConfig, ServerError, ServerResult};
pub use session::{
    Authenticator, ClientEstablishment, CredentialVerifier, NodeRegistrar, ServerEstablishment,
    SessionError, SessionResult,
};
pub use transport::{
    EnvelopeCodec, PairConnector, PairListener, PairTransport, StreamTransport, Transport,
    TransportError, TransportFactory, TransportListener,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
