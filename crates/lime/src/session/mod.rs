//! Session Layer - Establishment Protocol
//!
//! The handshake that advances a channel from `New` to `Established`:
//! option negotiation, transport reconfiguration and an arbitrary number of
//! authentication round-trips, driven asymmetrically by the client and
//! server roles. Caller-supplied collaborators plug in at the seams:
//! selectors pick negotiation options, an [`Authenticator`] produces the
//! client's credentials, a [`CredentialVerifier`] judges them on the
//! server, and a [`NodeRegistrar`] assigns the effective node address.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::authentication::{Authentication, AuthenticationResult, AuthenticationScheme};
use crate::protocol::{Identity, Node, SessionCompression, SessionEncryption};

// Module declarations
pub mod client;
pub mod error;
pub mod server;

// Public re-exports
pub use client::ClientEstablishment;
pub use error::{SessionError, SessionResult};
pub use server::ServerEstablishment;

/// Picks one compression option from a negotiation list
pub type CompressionSelector =
    Arc<dyn Fn(&[SessionCompression]) -> SessionCompression + Send + Sync>;

/// Picks one encryption option from a negotiation list
pub type EncryptionSelector = Arc<dyn Fn(&[SessionEncryption]) -> SessionEncryption + Send + Sync>;

/// Selector taking the first offered compression option
pub fn select_first_compression() -> CompressionSelector {
    Arc::new(|options| options.first().copied().unwrap_or(SessionCompression::None))
}

/// Selector taking the first offered encryption option
pub fn select_first_encryption() -> EncryptionSelector {
    Arc::new(|options| options.first().copied().unwrap_or(SessionEncryption::None))
}

/// Produces the client's credentials during the authentication exchange.
///
/// Called once per round-trip with the schemes the server accepts and the
/// round-trip payload the server sent, if any.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Produce the authentication payload for the next round-trip
    async fn authenticate(
        &self,
        schemes: &[AuthenticationScheme],
        round_trip: Option<Authentication>,
    ) -> Authentication;
}

/// Authenticator presenting anonymous guest credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct GuestAuthenticator;

#[async_trait]
impl Authenticator for GuestAuthenticator {
    async fn authenticate(
        &self,
        _schemes: &[AuthenticationScheme],
        _round_trip: Option<Authentication>,
    ) -> Authentication {
        Authentication::Guest
    }
}

/// Judges presented credentials on the server side.
///
/// Returning a result with a round-trip payload continues the exchange;
/// returning [`crate::authentication::DomainRole::Unknown`] with no
/// round-trip rejects the session.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify the credentials presented for the requested identity
    async fn verify(
        &self,
        identity: &Identity,
        authentication: &Authentication,
    ) -> AuthenticationResult;
}

/// Verifier accepting every presented credential as a domain member.
///
/// Suitable for guest-only deployments and tests; production servers plug
/// in a credential backend instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

#[async_trait]
impl CredentialVerifier for AcceptAllVerifier {
    async fn verify(
        &self,
        _identity: &Identity,
        _authentication: &Authentication,
    ) -> AuthenticationResult {
        AuthenticationResult::member()
    }
}

/// Assigns the effective node address once authentication succeeds
#[async_trait]
pub trait NodeRegistrar: Send + Sync {
    /// Map the candidate node to the address the session is bound to
    async fn register(&self, candidate: &Node, session_id: &str) -> Node;
}

/// Registrar keeping the candidate address, defaulting an empty instance
/// to `default`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRegistrar;

#[async_trait]
impl NodeRegistrar for DefaultRegistrar {
    async fn register(&self, candidate: &Node, _session_id: &str) -> Node {
        let mut node = candidate.clone();
        if node.instance.is_empty() {
            node.instance = "default".to_string();
        }
        node
    }
}
