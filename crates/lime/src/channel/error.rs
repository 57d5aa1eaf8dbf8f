//! Error types for channel operations.

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::protocol::SessionState;
use crate::transport::TransportError;

/// Channel error types
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The operation is not permitted in the current session state
    #[error("operation requires the '{expected}' state, but the session is '{actual}'")]
    WrongState {
        /// The state the operation requires
        expected: SessionState,
        /// The state the channel is in
        actual: SessionState,
    },

    /// A state transition attempted to move backwards
    #[error("cannot transition from '{current}' to '{requested}'")]
    StateRegression {
        /// The state the channel is in
        current: SessionState,
        /// The state that was requested
        requested: SessionState,
    },

    /// The transport reports it is not connected
    #[error("transport is not connected")]
    TransportNotConnected,

    /// The channel reached a terminal state; queues are drained and closed
    #[error("channel is closed")]
    Closed,

    /// A request with this id is already awaiting its response
    #[error("a command with id '{id}' is already in flight")]
    DuplicateCommandId {
        /// The colliding command id
        id: String,
    },

    /// Commands that expect a response must carry an id
    #[error("command id cannot be empty")]
    EmptyCommandId,

    /// Only requests may be processed; responses carry a status
    #[error("cannot process a command that carries a status")]
    UnexpectedCommandStatus,

    /// The peer sent an envelope family that is invalid at this point
    #[error("unexpected envelope received, expected a {expected}")]
    UnexpectedEnvelope {
        /// The envelope family that was required
        expected: &'static str,
    },

    /// Underlying transport fault
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Convenient result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
