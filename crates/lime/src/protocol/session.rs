//! Session envelopes and the session state machine.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::authentication::{Authentication, AuthenticationScheme};

use super::envelope::{EnvelopeHeader, Reason};

/// States of a session, totally ordered by [`SessionState::step`].
///
/// Transitions may only move forward; a channel rejects any attempt to
/// decrease its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Initial state of a freshly created channel
    New,
    /// Transport options are being negotiated
    Negotiating,
    /// The identity is being authenticated
    Authenticating,
    /// Application envelopes may flow
    Established,
    /// Graceful termination has been requested
    Finishing,
    /// The session ended gracefully
    Finished,
    /// Either side aborted the session
    Failed,
}

impl SessionState {
    /// Position of this state in the total order
    pub fn step(&self) -> u8 {
        match self {
            SessionState::New => 0,
            SessionState::Negotiating => 1,
            SessionState::Authenticating => 2,
            SessionState::Established => 3,
            SessionState::Finishing => 4,
            SessionState::Finished => 5,
            SessionState::Failed => 6,
        }
    }

    /// True for the terminal states `Finished` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "new",
            SessionState::Negotiating => "negotiating",
            SessionState::Authenticating => "authenticating",
            SessionState::Established => "established",
            SessionState::Finishing => "finishing",
            SessionState::Finished => "finished",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stream compression options negotiated during establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionCompression {
    /// No compression
    None,
    /// Gzip stream compression
    Gzip,
}

impl fmt::Display for SessionCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionCompression::None => "none",
            SessionCompression::Gzip => "gzip",
        })
    }
}

/// Stream encryption options negotiated during establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEncryption {
    /// No encryption
    None,
    /// TLS stream encryption
    Tls,
}

impl fmt::Display for SessionEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionEncryption::None => "none",
            SessionEncryption::Tls => "tls",
        })
    }
}

/// The control envelope advancing a session through its state machine.
///
/// Fields other than `state` are populated depending on the phase:
/// option lists while negotiating and authenticating, singular choices on
/// negotiation confirmations, an authentication payload during the
/// credential exchange, and a reason on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Common envelope attributes; `id` carries the session id
    pub header: EnvelopeHeader,
    /// The session state this envelope announces
    pub state: SessionState,
    /// Compression options offered for negotiation
    pub compression_options: Option<Vec<SessionCompression>>,
    /// The selected or confirmed compression
    pub compression: Option<SessionCompression>,
    /// Encryption options offered for negotiation
    pub encryption_options: Option<Vec<SessionEncryption>>,
    /// The selected or confirmed encryption
    pub encryption: Option<SessionEncryption>,
    /// Authentication schemes accepted by the server
    pub scheme_options: Option<Vec<AuthenticationScheme>>,
    /// Scheme-tagged credential payload or round-trip data
    pub authentication: Option<Authentication>,
    /// Failure details, present when `state` is `Failed`
    pub reason: Option<Reason>,
}

impl Session {
    /// Create a session envelope announcing the given state
    pub fn new(state: SessionState) -> Self {
        Self {
            header: EnvelopeHeader::default(),
            state,
            compression_options: None,
            compression: None,
            encryption_options: None,
            encryption: None,
            scheme_options: None,
            authentication: None,
            reason: None,
        }
    }

    /// Set the session id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.header.id = id.into();
        self
    }

    /// Build a `failed` envelope with the given reason
    pub fn failed(reason: Reason) -> Self {
        let mut session = Self::new(SessionState::Failed);
        session.reason = Some(reason);
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SessionState; 7] = [
        SessionState::New,
        SessionState::Negotiating,
        SessionState::Authenticating,
        SessionState::Established,
        SessionState::Finishing,
        SessionState::Finished,
        SessionState::Failed,
    ];

    #[test]
    fn test_step_total_order() {
        for window in ALL_STATES.windows(2) {
            assert!(window[0].step() < window[1].step());
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Finished.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Established.is_terminal());
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionState::Authenticating).unwrap(),
            r#""authenticating""#
        );
        let state: SessionState = serde_json::from_str(r#""established""#).unwrap();
        assert_eq!(state, SessionState::Established);
    }

    #[test]
    fn test_unknown_state_rejected() {
        assert!(serde_json::from_str::<SessionState>(r#""bogus""#).is_err());
    }
}
