//! Server-role session establishment.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::debug;

// Layer 3: Internal module imports
use crate::authentication::{AuthenticationScheme, DomainRole};
use crate::channel::{Channel, ChannelError};
use crate::protocol::{
    Node, Session, SessionCompression, SessionEncryption, SessionState,
};

use super::error::{SessionError, SessionResult};
use super::{AcceptAllVerifier, CredentialVerifier, DefaultRegistrar, NodeRegistrar};

/// Server side of the establishment handshake.
///
/// Receives the client's `new` session, negotiates transport options when
/// more than one is viable, drives the authentication exchange, registers
/// the client node and announces `established`. Any failure transitions
/// the channel to `Failed` and announces a `failed` envelope best-effort.
pub struct ServerEstablishment {
    /// The server's own node address, announced as `from`
    pub node: Node,
    /// Compression options this server offers
    pub compression_options: Vec<SessionCompression>,
    /// Encryption options this server offers
    pub encryption_options: Vec<SessionEncryption>,
    /// Authentication schemes this server accepts
    pub scheme_options: Vec<AuthenticationScheme>,
    /// Judges presented credentials
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Assigns the effective node address
    pub registrar: Arc<dyn NodeRegistrar>,
}

impl ServerEstablishment {
    /// Create an establishment offering plain streams and guest access
    pub fn new(node: Node) -> Self {
        Self {
            node,
            compression_options: vec![SessionCompression::None],
            encryption_options: vec![SessionEncryption::None],
            scheme_options: vec![AuthenticationScheme::Guest],
            verifier: Arc::new(AcceptAllVerifier),
            registrar: Arc::new(DefaultRegistrar),
        }
    }

    /// Replace the credential verifier
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace the node registrar
    pub fn with_registrar(mut self, registrar: Arc<dyn NodeRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Run the handshake on a channel in the `New` state, returning the
    /// node address assigned to the client.
    pub async fn establish(&self, channel: &Channel) -> SessionResult<Node> {
        match self.run(channel).await {
            Ok(node) => Ok(node),
            Err(error) => {
                if !channel.state().await.is_terminal() {
                    let _ = channel.fail_session(error.to_reason()).await;
                }
                debug!(%error, "server establishment failed");
                Err(error)
            }
        }
    }

    async fn run(&self, channel: &Channel) -> SessionResult<Node> {
        let state = channel.state().await;
        if state != SessionState::New {
            return Err(SessionError::Channel(ChannelError::WrongState {
                expected: SessionState::New,
                actual: state,
            }));
        }

        let new_session = channel.receive_session().await?;
        if new_session.state != SessionState::New {
            return Err(SessionError::ProtocolViolation {
                state: new_session.state,
            });
        }
        let session_id = channel.session_id().await;
        let candidate = new_session.header.from.clone().unwrap_or_default();

        self.negotiate(channel, &session_id, &new_session).await?;
        self.authenticate(channel, &session_id, &candidate).await?;

        let assigned = self.registrar.register(&candidate, &session_id).await;
        channel.set_local_node(Some(self.node.clone())).await;
        channel.set_remote_node(Some(assigned.clone())).await;
        channel.set_state(SessionState::Established).await?;

        let mut established = Session::new(SessionState::Established).with_id(session_id.clone());
        established.header.from = Some(self.node.clone());
        established.header.to = Some(assigned.clone());
        channel.send_session(established).await?;
        debug!(%session_id, node = %assigned, "session established");
        Ok(assigned)
    }

    /// Intersect the client-offered, server-offered and transport-supported
    /// option sets; run a negotiation round unless both intersections are
    /// singletons.
    async fn negotiate(
        &self,
        channel: &Channel,
        session_id: &str,
        new_session: &Session,
    ) -> SessionResult<()> {
        let transport = channel.transport();

        let negotiable_compression: Vec<SessionCompression> = transport
            .supported_compression()
            .into_iter()
            .filter(|option| self.compression_options.contains(option))
            .filter(|option| {
                new_session
                    .compression_options
                    .as_ref()
                    .map(|offered| offered.contains(option))
                    .unwrap_or(true)
            })
            .collect();
        let negotiable_encryption: Vec<SessionEncryption> = transport
            .supported_encryption()
            .into_iter()
            .filter(|option| self.encryption_options.contains(option))
            .filter(|option| {
                new_session
                    .encryption_options
                    .as_ref()
                    .map(|offered| offered.contains(option))
                    .unwrap_or(true)
            })
            .collect();

        if negotiable_compression.is_empty() {
            return Err(SessionError::NoCommonOptions {
                kind: "compression",
            });
        }
        if negotiable_encryption.is_empty() {
            return Err(SessionError::NoCommonOptions { kind: "encryption" });
        }
        if negotiable_compression.len() == 1 && negotiable_encryption.len() == 1 {
            return Ok(());
        }

        channel.set_state(SessionState::Negotiating).await?;
        let mut offer = Session::new(SessionState::Negotiating).with_id(session_id);
        offer.header.from = Some(self.node.clone());
        offer.compression_options = Some(negotiable_compression.clone());
        offer.encryption_options = Some(negotiable_encryption.clone());
        channel.send_session(offer).await?;

        let choice = channel.receive_session().await?;
        if choice.state != SessionState::Negotiating {
            return Err(SessionError::ProtocolViolation {
                state: choice.state,
            });
        }
        let (Some(compression), Some(encryption)) = (choice.compression, choice.encryption) else {
            return Err(SessionError::InvalidNegotiationOption);
        };
        if !negotiable_compression.contains(&compression)
            || !negotiable_encryption.contains(&encryption)
        {
            return Err(SessionError::InvalidNegotiationOption);
        }

        let mut confirmation = Session::new(SessionState::Negotiating).with_id(session_id);
        confirmation.header.from = Some(self.node.clone());
        confirmation.compression = Some(compression);
        confirmation.encryption = Some(encryption);
        channel.send_session(confirmation).await?;

        if transport.compression() != compression {
            transport
                .set_compression(compression)
                .await
                .map_err(ChannelError::from)?;
        }
        if transport.encryption() != encryption {
            transport
                .set_encryption(encryption)
                .await
                .map_err(ChannelError::from)?;
        }
        Ok(())
    }

    /// Drive the credential exchange until the verifier completes it:
    /// a round-trip payload goes back to the client and the loop repeats,
    /// an `Unknown` role rejects the session.
    async fn authenticate(
        &self,
        channel: &Channel,
        session_id: &str,
        candidate: &Node,
    ) -> SessionResult<()> {
        channel.set_state(SessionState::Authenticating).await?;
        let mut offer = Session::new(SessionState::Authenticating).with_id(session_id);
        offer.header.from = Some(self.node.clone());
        offer.scheme_options = Some(self.scheme_options.clone());
        channel.send_session(offer).await?;

        loop {
            let reply = channel.receive_session().await?;
            if reply.state != SessionState::Authenticating {
                return Err(SessionError::ProtocolViolation {
                    state: reply.state,
                });
            }
            let authentication = reply
                .authentication
                .ok_or(SessionError::MissingCredentials)?;

            let result = self
                .verifier
                .verify(&candidate.identity, &authentication)
                .await;
            if let Some(round_trip) = result.round_trip {
                let mut next = Session::new(SessionState::Authenticating).with_id(session_id);
                next.header.from = Some(self.node.clone());
                next.authentication = Some(round_trip);
                channel.send_session(next).await?;
                continue;
            }
            if result.role == DomainRole::Unknown {
                return Err(SessionError::AuthenticationRejected);
            }
            return Ok(());
        }
    }
}
