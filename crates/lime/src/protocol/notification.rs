//! Notification envelopes: message lifecycle events.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::envelope::{EnvelopeHeader, Reason};
use super::message::Message;

/// Lifecycle events reported about a previously sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    /// The node accepted the message for processing
    Accepted,
    /// The message was dispatched towards its destination
    Dispatched,
    /// The destination node received the message
    Received,
    /// The destination node processed the message
    Consumed,
    /// Processing failed; a reason is attached
    Failed,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationEvent::Accepted => "accepted",
            NotificationEvent::Dispatched => "dispatched",
            NotificationEvent::Received => "received",
            NotificationEvent::Consumed => "consumed",
            NotificationEvent::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An envelope reporting the lifecycle of a prior message, correlated by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Common envelope attributes; `id` matches the originating message
    pub header: EnvelopeHeader,
    /// The reported lifecycle event
    pub event: NotificationEvent,
    /// Failure details, present when `event` is `Failed`
    pub reason: Option<Reason>,
}

impl Notification {
    /// Create a notification with the given event
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            header: EnvelopeHeader::default(),
            event,
            reason: None,
        }
    }

    /// Build a notification acknowledging the given message, addressed back
    /// to its effective sender and correlated by the message id.
    pub fn for_message(message: &Message, event: NotificationEvent) -> Self {
        let mut notification = Self::new(event);
        notification.header.id = message.header.id.clone();
        notification.header.to = message.sender().cloned();
        notification.header.from = message.header.to.clone();
        notification
    }

    /// Build a `failed` notification with the given reason
    pub fn failure(id: impl Into<String>, reason: Reason) -> Self {
        let mut notification = Self::new(NotificationEvent::Failed);
        notification.header.id = id.into();
        notification.reason = Some(reason);
        notification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Document, Node};

    #[test]
    fn test_for_message_inverts_addresses() {
        let from: Node = "alice@limeprotocol.org/a".parse().unwrap();
        let to: Node = "bob@limeprotocol.org/b".parse().unwrap();
        let message = Message::new(Document::text_plain("hi"))
            .with_id("msg-1")
            .with_from(from.clone())
            .with_to(to.clone());

        let notification = Notification::for_message(&message, NotificationEvent::Received);
        assert_eq!(notification.header.id, "msg-1");
        assert_eq!(notification.header.to, Some(from));
        assert_eq!(notification.header.from, Some(to));
    }

    #[test]
    fn test_failure_carries_reason() {
        let notification = Notification::failure("msg-2", Reason::new(1, "processing failed"));
        assert_eq!(notification.event, NotificationEvent::Failed);
        assert_eq!(notification.reason.as_ref().map(|r| r.code), Some(1));
    }
}
