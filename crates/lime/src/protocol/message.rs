//! Message envelopes: typed document payloads between nodes.

// Layer 3: Internal module imports
use super::document::Document;
use super::envelope::EnvelopeHeader;
use super::node::Node;

/// An envelope carrying a typed document to another node.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::{Document, Message};
///
/// let message = Message::new(Document::text_plain("hello"))
///     .with_to("golang@limeprotocol.org/default".parse().unwrap());
/// assert_eq!(message.content.media_type.to_string(), "text/plain");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Common envelope attributes
    pub header: EnvelopeHeader,
    /// The document payload; always present
    pub content: Document,
}

impl Message {
    /// Create a message carrying the given document
    pub fn new(content: Document) -> Self {
        Self {
            header: EnvelopeHeader::default(),
            content,
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

    /// Set the origin node
    pub fn with_from(mut self, from: Node) -> Self {
        self.header.from = Some(from);
        self
    }

    /// The node that effectively sent this message: the delegate (`pp`)
    /// when present, the origin otherwise.
    pub fn sender(&self) -> Option<&Node> {
        self.header.pp.as_ref().or(self.header.from.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_prefers_delegate() {
        let from: Node = "origin@limeprotocol.org".parse().unwrap();
        let pp: Node = "delegate@limeprotocol.org".parse().unwrap();

        let mut message = Message::new(Document::text_plain("x")).with_from(from.clone());
        assert_eq!(message.sender(), Some(&from));

        message.header.pp = Some(pp.clone());
        assert_eq!(message.sender(), Some(&pp));
    }
}
