//! Command envelopes: resource-manipulation requests and responses.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
use super::document::Document;
use super::envelope::{EnvelopeHeader, Reason};
use super::node::Node;
use super::uri::LimeUri;

/// Resource-manipulation methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMethod {
    /// Read a resource
    Get,
    /// Replace a resource
    Set,
    /// Remove a resource
    Delete,
    /// Start observing a resource and receiving its events
    Subscribe,
    /// Stop observing a resource
    Unsubscribe,
    /// An event on an observed resource
    Observe,
    /// Merge into an existing resource
    Merge,
}

impl fmt::Display for CommandMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandMethod::Get => "get",
            CommandMethod::Set => "set",
            CommandMethod::Delete => "delete",
            CommandMethod::Subscribe => "subscribe",
            CommandMethod::Unsubscribe => "unsubscribe",
            CommandMethod::Observe => "observe",
            CommandMethod::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Outcome of a processed command request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// The request was processed
    Success,
    /// The request was not processed; a reason is attached
    Failure,
}

/// A resource-manipulation envelope.
///
/// A command with no `status` is a request; one with a `status` is a
/// response to the request with the same id.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::{Command, CommandMethod, LimeUri};
///
/// let request = Command::new_request(CommandMethod::Get, LimeUri::ping());
/// assert!(request.is_request());
///
/// let response = request.success_response();
/// assert!(response.is_response());
/// assert_eq!(response.header.id, request.header.id);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Common envelope attributes
    pub header: EnvelopeHeader,
    /// The method to apply to the resource
    pub method: CommandMethod,
    /// The resource address
    pub uri: Option<LimeUri>,
    /// A typed resource document attached to the command
    pub resource: Option<Document>,
    /// Response status; absent on requests
    pub status: Option<CommandStatus>,
    /// Failure details, present when `status` is `Failure`
    pub reason: Option<Reason>,
}

impl Command {
    /// Create a request with a freshly generated id
    pub fn new_request(method: CommandMethod, uri: LimeUri) -> Self {
        Self {
            header: EnvelopeHeader::with_new_id(),
            method,
            uri: Some(uri),
            resource: None,
            status: None,
            reason: None,
        }
    }

    /// Set the envelope id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.header.id = id.into();
        self
    }

    /// Set the destination node
    pub fn with_to(mut self, to: Node) -> Self {
        self.header.to = Some(to);
        self
    }

    /// Attach a resource document
    pub fn with_resource(mut self, resource: Document) -> Self {
        self.resource = Some(resource);
        self
    }

    /// True when this command expects to be processed (no status)
    pub fn is_request(&self) -> bool {
        self.status.is_none()
    }

    /// True when this command answers a request (status present)
    pub fn is_response(&self) -> bool {
        self.status.is_some()
    }

    /// Build a success response to this request, inverting the addresses
    pub fn success_response(&self) -> Self {
        self.response(CommandStatus::Success, None)
    }

    /// Build a success response carrying a resource document
    pub fn success_response_with_resource(&self, resource: Document) -> Self {
        let mut response = self.response(CommandStatus::Success, None);
        response.resource = Some(resource);
        response
    }

    /// Build a failure response with the given reason
    pub fn failure_response(&self, reason: Reason) -> Self {
        self.response(CommandStatus::Failure, Some(reason))
    }

    fn response(&self, status: CommandStatus, reason: Option<Reason>) -> Self {
        Self {
            header: EnvelopeHeader {
                id: self.header.id.clone(),
                from: self.header.to.clone(),
                pp: None,
                to: self.header.from.clone(),
                metadata: Default::default(),
            },
            method: self.method,
            uri: None,
            resource: None,
            status: Some(status),
            reason,
        }
    }

    /// Generate a new command id
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}
