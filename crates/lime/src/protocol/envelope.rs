//! The envelope union and its wire representation.
//!
//! Envelopes travel as JSON objects. Classification of a raw object is by
//! discriminator field: `method` marks a command, `event` a notification,
//! `state` a session, and `content`/`type` a message. Serialization goes
//! through [`RawEnvelope`], an intermediate record carrying every possible
//! field as optional so omission semantics stay in one place.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::authentication::{Authentication, AuthenticationScheme};

use super::command::{Command, CommandMethod, CommandStatus};
use super::document::{decode_document, Document};
use super::errors::{ProtocolError, ProtocolResult};
use super::media_type::MediaType;
use super::message::Message;
use super::node::Node;
use super::notification::{Notification, NotificationEvent};
use super::session::{Session, SessionCompression, SessionEncryption, SessionState};
use super::uri::LimeUri;

/// Attributes common to every envelope family.
///
/// An empty `id` means the envelope carries no id on the wire; envelopes
/// that expect a reply must carry one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeHeader {
    /// Per-envelope identifier, unique within a session
    pub id: String,
    /// Origin node
    pub from: Option<Node>,
    /// Delegate node acting on behalf of `from`
    pub pp: Option<Node>,
    /// Destination node
    pub to: Option<Node>,
    /// Opaque extension attributes
    pub metadata: HashMap<String, String>,
}

impl EnvelopeHeader {
    /// Create a header with a freshly generated UUID id
    pub fn with_new_id() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }
}

/// Failure details attached to notifications, command responses and
/// failed sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    /// Numeric failure code
    pub code: i32,
    /// Human-readable description
    pub description: String,
}

impl Reason {
    /// Create a reason from a code and description
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.description, self.code)
    }
}

/// A single protocol envelope of one of the four families.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::Envelope;
///
/// let json = r#"{"id":"1","method":"get","uri":"/ping"}"#;
/// let envelope = Envelope::from_json(json).unwrap();
/// assert!(matches!(envelope, Envelope::Command(_)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A typed document payload
    Message(Message),
    /// A message lifecycle event
    Notification(Notification),
    /// A resource-manipulation request or response
    Command(Command),
    /// A session control envelope
    Session(Session),
}

impl Envelope {
    /// Common attributes of the wrapped envelope
    pub fn header(&self) -> &EnvelopeHeader {
        match self {
            Envelope::Message(m) => &m.header,
            Envelope::Notification(n) => &n.header,
            Envelope::Command(c) => &c.header,
            Envelope::Session(s) => &s.header,
        }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize directly into a byte buffer
    pub fn serialize_to_buffer(&self, buffer: &mut BytesMut) -> ProtocolResult<()> {
        serde_json::to_writer(buffer.writer(), self)?;
        Ok(())
    }

    /// Serialize to a frozen byte buffer
    pub fn to_bytes(&self) -> ProtocolResult<Bytes> {
        let mut buffer = BytesMut::with_capacity(256);
        self.serialize_to_buffer(&mut buffer)?;
        Ok(buffer.freeze())
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Envelope::Message(message)
    }
}

impl From<Notification> for Envelope {
    fn from(notification: Notification) -> Self {
        Envelope::Notification(notification)
    }
}

impl From<Command> for Envelope {
    fn from(command: Command) -> Self {
        Envelope::Command(command)
    }
}

impl From<Session> for Envelope {
    fn from(session: Session) -> Self {
        Envelope::Session(session)
    }
}

/// Wire-level record with every possible envelope field as optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pp: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,

    // Message and command resource fields
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    // Notification fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<NotificationEvent>,

    // Command fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<CommandMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<LimeUri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CommandStatus>,

    // Session fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_options: Option<Vec<SessionCompression>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<SessionCompression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_options: Option<Vec<SessionEncryption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<SessionEncryption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_options: Option<Vec<AuthenticationScheme>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<AuthenticationScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Value>,

    // Shared by notifications, command responses and failed sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl RawEnvelope {
    fn header(&mut self) -> EnvelopeHeader {
        EnvelopeHeader {
            id: self.id.take().unwrap_or_default(),
            from: self.from.take(),
            pp: self.pp.take(),
            to: self.to.take(),
            metadata: self.metadata.take().unwrap_or_default(),
        }
    }

    fn with_header(header: &EnvelopeHeader) -> Self {
        Self {
            id: if header.id.is_empty() {
                None
            } else {
                Some(header.id.clone())
            },
            from: header.from.clone(),
            pp: header.pp.clone(),
            to: header.to.clone(),
            metadata: if header.metadata.is_empty() {
                None
            } else {
                Some(header.metadata.clone())
            },
            ..Default::default()
        }
    }
}

impl Envelope {
    pub(crate) fn to_raw(&self) -> RawEnvelope {
        match self {
            Envelope::Message(message) => {
                let mut raw = RawEnvelope::with_header(&message.header);
                raw.media_type = Some(message.content.media_type.clone());
                raw.content = Some(message.content.content.to_value());
                raw
            }
            Envelope::Notification(notification) => {
                let mut raw = RawEnvelope::with_header(&notification.header);
                raw.event = Some(notification.event);
                raw.reason = notification.reason.clone();
                raw
            }
            Envelope::Command(command) => {
                let mut raw = RawEnvelope::with_header(&command.header);
                raw.method = Some(command.method);
                raw.uri = command.uri.clone();
                if let Some(resource) = &command.resource {
                    raw.media_type = Some(resource.media_type.clone());
                    raw.resource = Some(resource.content.to_value());
                }
                raw.status = command.status;
                raw.reason = command.reason.clone();
                raw
            }
            Envelope::Session(session) => {
                let mut raw = RawEnvelope::with_header(&session.header);
                raw.state = Some(session.state);
                raw.compression_options = session.compression_options.clone();
                raw.compression = session.compression;
                raw.encryption_options = session.encryption_options.clone();
                raw.encryption = session.encryption;
                raw.scheme_options = session.scheme_options.clone();
                if let Some(authentication) = &session.authentication {
                    raw.scheme = Some(authentication.scheme());
                    raw.authentication = Some(authentication.to_payload());
                }
                raw.reason = session.reason.clone();
                raw
            }
        }
    }

    pub(crate) fn try_from_raw(mut raw: RawEnvelope) -> ProtocolResult<Self> {
        if let Some(method) = raw.method {
            let header = raw.header();
            let resource = match (raw.media_type, raw.resource) {
                (Some(media_type), Some(resource)) => {
                    Some(decode_document(&media_type, resource)?)
                }
                (None, None) => None,
                _ => {
                    return Err(ProtocolError::invalid_envelope(
                        "command resource requires both 'type' and 'resource'",
                    ))
                }
            };
            return Ok(Envelope::Command(Command {
                header,
                method,
                uri: raw.uri,
                resource,
                status: raw.status,
                reason: raw.reason,
            }));
        }

        if let Some(event) = raw.event {
            let header = raw.header();
            return Ok(Envelope::Notification(Notification {
                header,
                event,
                reason: raw.reason,
            }));
        }

        if let Some(state) = raw.state {
            let header = raw.header();
            let authentication = match (raw.scheme, raw.authentication) {
                (Some(scheme), Some(payload)) => {
                    Some(Authentication::from_scheme_payload(scheme, payload)?)
                }
                (Some(scheme), None) => Some(Authentication::from_scheme_payload(
                    scheme,
                    Value::Object(Default::default()),
                )?),
                (None, Some(_)) => {
                    return Err(ProtocolError::invalid_envelope(
                        "session authentication requires a 'scheme'",
                    ))
                }
                (None, None) => None,
            };
            return Ok(Envelope::Session(Session {
                header,
                state,
                compression_options: raw.compression_options,
                compression: raw.compression,
                encryption_options: raw.encryption_options,
                encryption: raw.encryption,
                scheme_options: raw.scheme_options,
                authentication,
                reason: raw.reason,
            }));
        }

        if raw.content.is_some() || raw.media_type.is_some() {
            let header = raw.header();
            let media_type = raw
                .media_type
                .ok_or_else(|| ProtocolError::invalid_envelope("message requires a 'type'"))?;
            let content = raw
                .content
                .ok_or_else(|| ProtocolError::invalid_envelope("message requires a 'content'"))?;
            return Ok(Envelope::Message(Message {
                header,
                content: decode_document(&media_type, content)?,
            }));
        }

        Err(ProtocolError::invalid_envelope(
            "no discriminator field ('method', 'event', 'state' or 'content')",
        ))
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        Envelope::try_from_raw(raw).map_err(serde::de::Error::custom)
    }
}
