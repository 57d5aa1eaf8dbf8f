//! Protocol Layer - Envelope Data Model and Wire Format
//!
//! This module defines the four envelope families (Message, Notification,
//! Command, Session), the addressing and media-type grammars, typed
//! documents with their media-type registry, and the JSON wire format.
//!
//! ## Module Organization
//!
//! - `envelope`: the envelope union, common attributes, wire intermediate
//! - `message`, `notification`, `command`, `session`: the envelope families
//! - `node`: identities and node addresses
//! - `media_type`: the `type/subtype(+suffix)?` grammar
//! - `uri`: `lime`-scheme resource URIs
//! - `document`: typed payloads and the media-type registry
//! - `constants`: well-known URIs, media types and reason codes
//! - `errors`: parse and serialization errors

// Module declarations (declarations only in mod.rs)
pub mod command;
pub mod constants;
pub mod document;
pub mod envelope;
pub mod errors;
pub mod media_type;
pub mod message;
pub mod node;
pub mod notification;
pub mod session;
pub mod uri;

// Public re-exports (clean API surface)
pub use command::{Command, CommandMethod, CommandStatus};
pub use document::{
    decode_document, register_document_factory, Document, DocumentContent, DocumentFactory,
};
pub use envelope::{Envelope, EnvelopeHeader, Reason};
pub use errors::{ProtocolError, ProtocolResult};
pub use media_type::MediaType;
pub use message::Message;
pub use node::{Identity, Node};
pub use notification::{Notification, NotificationEvent};
pub use session::{Session, SessionCompression, SessionEncryption, SessionState};
pub use uri::LimeUri;
