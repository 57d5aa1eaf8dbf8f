//! Client-role session establishment.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::debug;

// Layer 3: Internal module imports
use crate::channel::{Channel, ChannelError};
use crate::protocol::constants::reason_codes;
use crate::protocol::{Identity, Node, Reason, Session, SessionState};

use super::error::{SessionError, SessionResult};
use super::{
    select_first_compression, select_first_encryption, Authenticator, CompressionSelector,
    EncryptionSelector, GuestAuthenticator,
};

/// Client side of the establishment handshake.
///
/// Sends the `new` session, answers negotiation and authentication rounds
/// driven by the server, and transitions the channel to `Established` (or
/// `Failed`) according to the server's final envelope.
///
/// # Examples
///
/// ```rust,no_run
/// use lime::session::ClientEstablishment;
///
/// let establishment = ClientEstablishment::new(
///     "golang@limeprotocol.org".parse().unwrap(),
///     "home",
/// );
/// # let _ = establishment;
/// ```
pub struct ClientEstablishment {
    /// The identity to present
    pub identity: Identity,
    /// The instance to present
    pub instance: String,
    /// Picks the compression when the server negotiates
    pub compression_selector: CompressionSelector,
    /// Picks the encryption when the server negotiates
    pub encryption_selector: EncryptionSelector,
    /// Produces credentials during the authentication exchange
    pub authenticator: Arc<dyn Authenticator>,
}

impl ClientEstablishment {
    /// Create an establishment with first-option selectors and guest
    /// credentials
    pub fn new(identity: Identity, instance: impl Into<String>) -> Self {
        Self {
            identity,
            instance: instance.into(),
            compression_selector: select_first_compression(),
            encryption_selector: select_first_encryption(),
            authenticator: Arc::new(GuestAuthenticator),
        }
    }

    /// Replace the authenticator
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Run the handshake on a channel in the `New` state.
    ///
    /// A server-announced failure is not an error: the channel transitions
    /// to `Failed`, the transport is closed, and the `failed` envelope is
    /// returned for the caller to inspect its reason.
    pub async fn establish(&self, channel: &Channel) -> SessionResult<Session> {
        let state = channel.state().await;
        if state != SessionState::New {
            return Err(SessionError::Channel(ChannelError::WrongState {
                expected: SessionState::New,
                actual: state,
            }));
        }

        let local_node = Node::new(self.identity.clone(), self.instance.clone());
        let mut new_session = Session::new(SessionState::New);
        new_session.header.from = Some(local_node.clone());
        new_session.compression_options = Some(channel.transport().supported_compression());
        new_session.encryption_options = Some(channel.transport().supported_encryption());
        channel.send_session(new_session).await?;

        loop {
            let session = channel.receive_session().await?;
            match session.state {
                SessionState::Negotiating => {
                    channel.set_state(SessionState::Negotiating).await?;
                    self.handle_negotiating(channel, &session).await?;
                }
                SessionState::Authenticating => {
                    channel.set_state(SessionState::Authenticating).await?;
                    self.handle_authenticating(channel, &session, &local_node)
                        .await?;
                }
                SessionState::Established => {
                    channel.set_session_id(session.header.id.clone()).await;
                    channel.set_remote_node(session.header.from.clone()).await;
                    channel.set_local_node(session.header.to.clone()).await;
                    channel.set_state(SessionState::Established).await?;
                    debug!(
                        session_id = %session.header.id,
                        remote = ?session.header.from,
                        "session established"
                    );
                    return Ok(session);
                }
                SessionState::Failed => {
                    channel.set_state(SessionState::Failed).await?;
                    let _ = channel.close_transport().await;
                    debug!(reason = ?session.reason, "session failed by the server");
                    return Ok(session);
                }
                state => {
                    let _ = channel
                        .fail_session(Reason::new(
                            reason_codes::GENERAL_ERROR,
                            format!("unexpected session state '{state}'"),
                        ))
                        .await;
                    return Err(SessionError::ProtocolViolation { state });
                }
            }
        }
    }

    /// Answer a negotiation round: an option list gets a selection, a
    /// singular confirmation reconfigures the transport when it differs
    /// from the current stream options.
    async fn handle_negotiating(&self, channel: &Channel, session: &Session) -> SessionResult<()> {
        if let (Some(compression_options), Some(encryption_options)) = (
            session.compression_options.as_deref(),
            session.encryption_options.as_deref(),
        ) {
            let compression = (self.compression_selector)(compression_options);
            let encryption = (self.encryption_selector)(encryption_options);
            let mut choice =
                Session::new(SessionState::Negotiating).with_id(session.header.id.clone());
            choice.compression = Some(compression);
            choice.encryption = Some(encryption);
            channel.send_session(choice).await?;
            return Ok(());
        }

        let transport = channel.transport();
        if let Some(compression) = session.compression {
            if transport.compression() != compression {
                transport
                    .set_compression(compression)
                    .await
                    .map_err(ChannelError::from)?;
            }
        }
        if let Some(encryption) = session.encryption {
            if transport.encryption() != encryption {
                transport
                    .set_encryption(encryption)
                    .await
                    .map_err(ChannelError::from)?;
            }
        }
        Ok(())
    }

    async fn handle_authenticating(
        &self,
        channel: &Channel,
        session: &Session,
        local_node: &Node,
    ) -> SessionResult<()> {
        let schemes = session.scheme_options.clone().unwrap_or_default();
        let authentication = self
            .authenticator
            .authenticate(&schemes, session.authentication.clone())
            .await;

        let mut reply =
            Session::new(SessionState::Authenticating).with_id(session.header.id.clone());
        reply.header.from = Some(local_node.clone());
        reply.authentication = Some(authentication);
        channel.send_session(reply).await?;
        Ok(())
    }
}
