//! Node addressing: identities and node instances.
//!
//! A node is the addressable unit of the protocol, written as
//! `name@domain/instance`. Parts that are empty are omitted together with
//! their separators, so `name@domain`, `name` and the empty string are all
//! valid node forms.

// Layer 1: Standard library imports
use std::fmt;
use std::str::FromStr;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A protocol identity: a name within a domain.
///
/// String form is `name@domain`; an empty domain collapses to just `name`.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::Identity;
///
/// let identity: Identity = "golang@limeprotocol.org".parse().unwrap();
/// assert_eq!(identity.name, "golang");
/// assert_eq!(identity.domain, "limeprotocol.org");
/// assert_eq!(identity.to_string(), "golang@limeprotocol.org");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Name part, before the `@`
    pub name: String,
    /// Domain part, after the `@`
    pub domain: String,
}

impl Identity {
    /// Create an identity from name and domain parts
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }

    /// True when both parts are empty
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.domain.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.domain)
        }
    }
}

impl FromStr for Identity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once('@') {
            Some((name, domain)) => Identity::new(name, domain),
            None => Identity::new(s, ""),
        })
    }
}

/// A network node: an identity plus an instance.
///
/// String form is `name@domain/instance`. The empty node is the
/// distinguished zero value and renders as the empty string.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::Node;
///
/// let node: Node = "golang@limeprotocol.org/default".parse().unwrap();
/// assert_eq!(node.identity.name, "golang");
/// assert_eq!(node.instance, "default");
/// assert_eq!(node.to_string(), "golang@limeprotocol.org/default");
///
/// assert!(Node::default().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Node {
    /// The identity this node belongs to
    pub identity: Identity,
    /// Instance discriminator, after the `/`
    pub instance: String,
}

impl Node {
    /// Create a node from an identity and instance
    pub fn new(identity: Identity, instance: impl Into<String>) -> Self {
        Self {
            identity,
            instance: instance.into(),
        }
    }

    /// True when all parts are empty (the zero node)
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty() && self.instance.is_empty()
    }

    /// The conventional server node of a domain
    pub fn postmaster(domain: impl Into<String>) -> Self {
        Node::new(Identity::new("postmaster", domain), "")
    }
}

impl From<Identity> for Node {
    fn from(identity: Identity) -> Self {
        Node::new(identity, "")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_empty() {
            write!(f, "{}", self.identity)
        } else {
            write!(f, "{}/{}", self.identity, self.instance)
        }
    }
}

impl FromStr for Node {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (identity_part, instance) = match s.split_once('/') {
            Some((identity, instance)) => (identity, instance),
            None => (s, ""),
        };
        // Identity parsing cannot fail
        let identity = identity_part.parse().unwrap_or_default();
        Ok(Node::new(identity, instance))
    }
}

// Nodes travel on the wire in their string form.
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}
