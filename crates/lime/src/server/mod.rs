//! Server Layer - Listener Fan-In and Per-Connection Sessions
//!
//! A server binds one or more transport listeners. Each listener gets an
//! acceptor task publishing inbound transports onto a bounded dispatch
//! queue; a consumer drains the queue, wraps every transport in a
//! server-role channel with a fresh session id, and spawns a
//! per-connection task that runs establishment, feeds the mux and finishes
//! the session on the way out.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::authentication::AuthenticationScheme;
use crate::channel::{Channel, ChannelConfig};
use crate::mux::{
    CommandHandler, CommandPredicate, EnvelopeMux, MessageHandler, MessagePredicate,
    NotificationHandler, NotificationPredicate, ResponseHandler,
};
use crate::protocol::{Node, SessionCompression, SessionEncryption, SessionState};
use crate::session::{CredentialVerifier, NodeRegistrar, ServerEstablishment};
use crate::transport::{TransportError, TransportListener};

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    /// `listen_and_serve` requires at least one bound listener
    #[error("server has no listeners")]
    NoListeners,

    /// Listener fault
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Convenient result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Configuration for server behavior
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity of the accepted-transport dispatch queue
    pub backlog: usize,
    /// Queue capacity of each per-connection channel
    pub channel_buffer_size: usize,
    /// Deadline applied to the graceful finish of each connection
    pub finish_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: 32,
            channel_buffer_size: 32,
            finish_timeout: Duration::from_secs(5),
        }
    }
}

/// Invoked when a connection's session is established
pub type EstablishedCallback = Arc<dyn Fn(&str, &Arc<Channel>) + Send + Sync>;

/// Invoked when a connection's session ends
pub type FinishedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Builder for servers
pub struct ServerBuilder {
    listeners: Vec<Arc<dyn TransportListener>>,
    establishment: ServerEstablishment,
    mux: EnvelopeMux,
    config: ServerConfig,
    on_established: Option<EstablishedCallback>,
    on_finished: Option<FinishedCallback>,
}

impl ServerBuilder {
    /// Create a builder announcing the given server node
    pub fn new(node: Node) -> Self {
        Self {
            listeners: Vec::new(),
            establishment: ServerEstablishment::new(node),
            mux: EnvelopeMux::new(),
            config: ServerConfig::default(),
            on_established: None,
            on_finished: None,
        }
    }

    /// Bind a transport listener
    pub fn listener(mut self, listener: Arc<dyn TransportListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Set the compression options the server offers
    pub fn compression_options(mut self, options: Vec<SessionCompression>) -> Self {
        self.establishment.compression_options = options;
        self
    }

    /// Set the encryption options the server offers
    pub fn encryption_options(mut self, options: Vec<SessionEncryption>) -> Self {
        self.establishment.encryption_options = options;
        self
    }

    /// Set the authentication schemes the server accepts
    pub fn scheme_options(mut self, options: Vec<AuthenticationScheme>) -> Self {
        self.establishment.scheme_options = options;
        self
    }

    /// Replace the credential verifier
    pub fn verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.establishment.verifier = verifier;
        self
    }

    /// Replace the node registrar
    pub fn registrar(mut self, registrar: Arc<dyn NodeRegistrar>) -> Self {
        self.establishment.registrar = registrar;
        self
    }

    /// Register a message handler behind a predicate
    pub fn message_handler(
        mut self,
        predicate: MessagePredicate,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.mux.register_message_handler(predicate, handler);
        self
    }

    /// Register a notification handler behind a predicate
    pub fn notification_handler(
        mut self,
        predicate: NotificationPredicate,
        handler: Arc<dyn NotificationHandler>,
    ) -> Self {
        self.mux.register_notification_handler(predicate, handler);
        self
    }

    /// Register a command-request handler behind a predicate
    pub fn command_handler(
        mut self,
        predicate: CommandPredicate,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        self.mux.register_command_handler(predicate, handler);
        self
    }

    /// Register a handler for unclaimed command responses
    pub fn response_handler(
        mut self,
        predicate: CommandPredicate,
        handler: Arc<dyn ResponseHandler>,
    ) -> Self {
        self.mux.register_response_handler(predicate, handler);
        self
    }

    /// Register the `get /ping` auto-responder
    pub fn auto_ping(mut self) -> Self {
        self.mux.register_ping_handler();
        self
    }

    /// Set the accepted-transport dispatch queue capacity
    pub fn backlog(mut self, backlog: usize) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Set the queue capacity of each per-connection channel
    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.config.channel_buffer_size = size;
        self
    }

    /// Invoke the callback when a session is established
    pub fn on_established(mut self, callback: EstablishedCallback) -> Self {
        self.on_established = Some(callback);
        self
    }

    /// Invoke the callback when a session ends
    pub fn on_finished(mut self, callback: FinishedCallback) -> Self {
        self.on_finished = Some(callback);
        self
    }

    /// Build the server
    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(ServerInner {
                listeners: self.listeners,
                establishment: self.establishment,
                mux: Arc::new(self.mux),
                config: self.config,
                on_established: self.on_established,
                on_finished: self.on_finished,
                cancel: CancellationToken::new(),
            }),
        }
    }
}

struct ServerInner {
    listeners: Vec<Arc<dyn TransportListener>>,
    establishment: ServerEstablishment,
    mux: Arc<EnvelopeMux>,
    config: ServerConfig,
    on_established: Option<EstablishedCallback>,
    on_finished: Option<FinishedCallback>,
    cancel: CancellationToken,
}

/// A listener fan-in server running one session per accepted transport
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Accept and serve connections until [`Server::close`] is called.
    ///
    /// Returns after every acceptor and per-connection task has drained.
    pub async fn listen_and_serve(&self) -> ServerResult<()> {
        if self.inner.listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }

        let (dispatch_tx, mut dispatch_rx) =
            mpsc::channel(self.inner.config.backlog.max(1));
        let mut acceptors = Vec::with_capacity(self.inner.listeners.len());
        for listener in &self.inner.listeners {
            let listener = Arc::clone(listener);
            let dispatch = dispatch_tx.clone();
            let cancel = self.inner.cancel.clone();
            acceptors.push(tokio::spawn(async move {
                loop {
                    let transport = tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = listener.accept() => match result {
                            Ok(transport) => transport,
                            Err(error) => {
                                debug!(%error, "listener stopped accepting");
                                break;
                            }
                        }
                    };
                    if dispatch.send(transport).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(dispatch_tx);

        let mut connections = JoinSet::new();
        loop {
            let transport = tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                item = dispatch_rx.recv() => match item {
                    Some(transport) => transport,
                    None => break,
                }
            };
            let channel = Arc::new(Channel::for_server_with_config(
                Arc::from(transport),
                Uuid::new_v4().to_string(),
                ChannelConfig {
                    buffer_size: self.inner.config.channel_buffer_size,
                },
            ));
            connections.spawn(serve_connection(Arc::clone(&self.inner), channel));
        }

        for acceptor in acceptors {
            let _ = acceptor.await;
        }
        while connections.join_next().await.is_some() {}
        Ok(())
    }

    /// Stop accepting, close the listeners and let running connections
    /// drain
    pub async fn close(&self) -> ServerResult<()> {
        self.inner.cancel.cancel();
        for listener in &self.inner.listeners {
            let _ = listener.close().await;
        }
        Ok(())
    }
}

async fn serve_connection(inner: Arc<ServerInner>, channel: Arc<Channel>) {
    let session_id = channel.session_id().await;
    let established = tokio::select! {
        _ = inner.cancel.cancelled() => None,
        result = inner.establishment.establish(&channel) => match result {
            Ok(node) => Some(node),
            Err(error) => {
                debug!(%session_id, %error, "connection establishment failed");
                return;
            }
        }
    };
    let Some(node) = established else {
        if !channel.state().await.is_terminal() {
            let _ = channel.set_state(SessionState::Failed).await;
        }
        let _ = channel.close_transport().await;
        return;
    };
    debug!(%session_id, %node, "connection established");
    if let Some(callback) = &inner.on_established {
        callback(&session_id, &channel);
    }

    tokio::select! {
        _ = inner.cancel.cancelled() => {}
        _ = inner.mux.listen(Arc::clone(&channel)) => {}
    }

    // The outer server may already be shutting down; the graceful finish
    // runs under its own deadline.
    if channel.is_established().await {
        let finish =
            tokio::time::timeout(inner.config.finish_timeout, channel.finish_session()).await;
        if !matches!(finish, Ok(Ok(()))) {
            let _ = channel.close_transport().await;
        }
    } else {
        if !channel.state().await.is_terminal() {
            let _ = channel.set_state(SessionState::Failed).await;
        }
        let _ = channel.close_transport().await;
    }
    if let Some(callback) = &inner.on_finished {
        callback(&session_id);
    }
    debug!(%session_id, "connection finished");
}
