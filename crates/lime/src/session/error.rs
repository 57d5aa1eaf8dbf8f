//! Error types for session establishment.

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::channel::ChannelError;
use crate::protocol::constants::reason_codes;
use crate::protocol::{Reason, SessionState};

/// Session establishment error types
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer announced a session state that is invalid at this point of
    /// the handshake
    #[error("protocol violation: unexpected session state '{state}'")]
    ProtocolViolation {
        /// The state the peer announced
        state: SessionState,
    },

    /// The intersection of offered and supported options is empty
    #[error("no common {kind} options to negotiate")]
    NoCommonOptions {
        /// Which option set was empty (`compression` or `encryption`)
        kind: &'static str,
    },

    /// The peer selected an option that was not offered
    #[error("the selected negotiation option was not offered")]
    InvalidNegotiationOption,

    /// An authenticating reply carried no credentials
    #[error("authenticating reply carried no credentials")]
    MissingCredentials,

    /// The credential verifier rejected the presented identity
    #[error("authentication rejected")]
    AuthenticationRejected,

    /// Channel or transport fault during the handshake
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Convenient result type for establishment operations
pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// The failure reason to announce to the peer for this error
    pub fn to_reason(&self) -> Reason {
        match self {
            SessionError::NoCommonOptions { .. } | SessionError::InvalidNegotiationOption => {
                Reason::new(
                    reason_codes::SESSION_NEGOTIATION_INVALID_OPTIONS,
                    self.to_string(),
                )
            }
            SessionError::MissingCredentials | SessionError::AuthenticationRejected => {
                Reason::new(reason_codes::SESSION_AUTHENTICATION_FAILED, self.to_string())
            }
            other => Reason::new(reason_codes::GENERAL_ERROR, other.to_string()),
        }
    }
}
