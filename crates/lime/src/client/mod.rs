//! Client Layer - Supervised Session Client
//!
//! A client owns a transport factory, an establishment configuration and a
//! mux, and keeps at most one active channel behind a read/write lock.
//! Every operation routes through channel acquisition: when no established
//! channel exists, construction and establishment are serialized on a
//! lifecycle lock and retried with quadratic backoff. A background
//! listener task feeds the mux and transparently re-establishes the
//! session whenever the channel tears down.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// Layer 3: Internal module imports
use crate::channel::{Channel, ChannelConfig, ChannelError};
use crate::mux::{
    CommandHandler, CommandPredicate, EnvelopeMux, MessageHandler, MessagePredicate,
    NotificationHandler, NotificationPredicate, ResponseHandler,
};
use crate::protocol::{Command, Identity, Message, Notification, SessionState};
use crate::session::{Authenticator, ClientEstablishment, CompressionSelector, EncryptionSelector};
use crate::transport::TransportFactory;

/// Base interval of the quadratic establishment backoff
const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client was closed
    #[error("client is closed")]
    Closed,

    /// The operation did not complete within its deadline
    #[error("operation timed out after {timeout:?}")]
    Timeout {
        /// The deadline that expired
        timeout: Duration,
    },

    /// A session establishment attempt did not produce an established
    /// channel
    #[error("session establishment failed: {reason}")]
    Establishment {
        /// What went wrong, including a server-announced failure reason
        reason: String,
    },

    /// Channel fault surfaced by an operation
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Convenient result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Configuration for client behavior
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Queue capacity of each channel the client builds
    pub channel_buffer_size: usize,
    /// Deadline applied to `process_command`
    pub command_timeout: Duration,
    /// Deadline applied to the graceful finish during `close`
    pub finish_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 32,
            command_timeout: Duration::from_secs(30),
            finish_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for supervised clients
pub struct ClientBuilder {
    factory: Arc<dyn TransportFactory>,
    establishment: ClientEstablishment,
    mux: EnvelopeMux,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder presenting the given identity, dialing through the
    /// given factory
    pub fn new(identity: Identity, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            establishment: ClientEstablishment::new(identity, "default"),
            mux: EnvelopeMux::new(),
            config: ClientConfig::default(),
        }
    }

    /// Set the instance to present
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.establishment.instance = instance.into();
        self
    }

    /// Replace the authenticator
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.establishment.authenticator = authenticator;
        self
    }

    /// Replace the compression selector
    pub fn compression_selector(mut self, selector: CompressionSelector) -> Self {
        self.establishment.compression_selector = selector;
        self
    }

    /// Replace the encryption selector
    pub fn encryption_selector(mut self, selector: EncryptionSelector) -> Self {
        self.establishment.encryption_selector = selector;
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

    /// Set the deadline applied to `process_command`
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the queue capacity of each channel the client builds
    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.config.channel_buffer_size = size;
        self
    }

    /// Set the deadline applied to the graceful finish during `close`
    pub fn finish_timeout(mut self, timeout: Duration) -> Self {
        self.config.finish_timeout = timeout;
        self
    }

    /// Build the client and start its listener task
    pub fn build(self) -> Client {
        let inner = Arc::new(ClientInner {
            factory: self.factory,
            establishment: self.establishment,
            mux: Arc::new(self.mux),
            config: self.config,
            channel: RwLock::new(None),
            lifecycle: Mutex::new(()),
            cancel: CancellationToken::new(),
        });
        let listener = tokio::spawn(listen(Arc::clone(&inner)));
        Client {
            inner,
            listener: Mutex::new(Some(listener)),
        }
    }
}

struct ClientInner {
    factory: Arc<dyn TransportFactory>,
    establishment: ClientEstablishment,
    mux: Arc<EnvelopeMux>,
    config: ClientConfig,
    channel: RwLock<Option<Arc<Channel>>>,
    lifecycle: Mutex<()>,
    cancel: CancellationToken,
}

/// A supervised client that transparently re-establishes its session.
///
/// Send operations block until an established channel is available or the
/// caller's deadline fires; on permanent peer disconnection the listener
/// task rebuilds the session with quadratic backoff.
pub struct Client {
    inner: Arc<ClientInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Force establishment of a session without sending anything
    pub async fn establish(&self) -> ClientResult<()> {
        self.inner.acquire_channel().await.map(|_| ())
    }

    /// The active channel, when one is established
    pub async fn channel(&self) -> Option<Arc<Channel>> {
        self.inner.channel.read().await.clone()
    }

    /// Send a message over the supervised session
    pub async fn send_message(&self, message: Message) -> ClientResult<()> {
        let channel = self.inner.acquire_channel().await?;
        channel.send_message(message).await.map_err(Into::into)
    }

    /// Send a notification over the supervised session
    pub async fn send_notification(&self, notification: Notification) -> ClientResult<()> {
        let channel = self.inner.acquire_channel().await?;
        channel
            .send_notification(notification)
            .await
            .map_err(Into::into)
    }

    /// Send a command over the supervised session
    pub async fn send_command(&self, command: Command) -> ClientResult<()> {
        let channel = self.inner.acquire_channel().await?;
        channel.send_command(command).await.map_err(Into::into)
    }

    /// Send a command request and await its correlated response, bounded
    /// by the configured command timeout
    pub async fn process_command(&self, command: Command) -> ClientResult<Command> {
        let channel = self.inner.acquire_channel().await?;
        let timeout = self.inner.config.command_timeout;
        tokio::time::timeout(timeout, channel.process_command(command))
            .await
            .map_err(|_| ClientError::Timeout { timeout })?
            .map_err(Into::into)
    }

    /// Stop the listener and terminate the active session.
    ///
    /// An established session is finished gracefully within the configured
    /// finish deadline; otherwise the transport is closed directly.
    pub async fn close(&self) -> ClientResult<()> {
        self.inner.cancel.cancel();
        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.await;
        }

        let _guard = self.inner.lifecycle.lock().await;
        if let Some(channel) = self.inner.channel.write().await.take() {
            if channel.is_established().await {
                let finish = tokio::time::timeout(
                    self.inner.config.finish_timeout,
                    channel.finish_session(),
                )
                .await;
                if !matches!(finish, Ok(Ok(()))) {
                    let _ = channel.close_transport().await;
                }
            } else {
                let _ = channel.close_transport().await;
            }
        }
        Ok(())
    }
}

impl ClientInner {
    /// Return the established channel, building one when necessary.
    ///
    /// The fast path reads the shared channel slot; the slow path
    /// serializes on the lifecycle lock, re-checks, then loops dial and
    /// establishment with quadratic backoff until success or closure.
    async fn acquire_channel(&self) -> ClientResult<Arc<Channel>> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        if let Some(channel) = self.channel.read().await.as_ref() {
            if channel.is_established().await {
                return Ok(Arc::clone(channel));
            }
        }

        let _guard = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ClientError::Closed),
            guard = self.lifecycle.lock() => guard,
        };
        if let Some(channel) = self.channel.read().await.as_ref() {
            if channel.is_established().await {
                return Ok(Arc::clone(channel));
            }
        }

        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Closed);
            }
            let backoff = BACKOFF_BASE.saturating_mul(attempt.saturating_mul(attempt));
            if !backoff.is_zero() {
                debug!(attempt, ?backoff, "backing off before re-establishment");
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(ClientError::Closed),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            if let Some(stale) = self.channel.write().await.take() {
                if !stale.state().await.is_terminal() {
                    let _ = stale.set_state(SessionState::Failed).await;
                }
                let _ = stale.close_transport().await;
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ClientError::Closed),
                outcome = self.try_establish() => outcome,
            };
            match outcome {
                Ok(channel) => {
                    *self.channel.write().await = Some(Arc::clone(&channel));
                    return Ok(channel);
                }
                Err(error) => {
                    debug!(%error, attempt, "session establishment attempt failed");
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn try_establish(&self) -> ClientResult<Arc<Channel>> {
        let transport = self.factory.dial().await.map_err(ChannelError::from)?;
        let channel = Arc::new(Channel::with_config(
            Arc::from(transport),
            ChannelConfig {
                buffer_size: self.config.channel_buffer_size,
            },
        ));
        match self.establishment.establish(&channel).await {
            Ok(session) => {
                if channel.is_established().await {
                    return Ok(channel);
                }
                let _ = channel.close_transport().await;
                Err(ClientError::Establishment {
                    reason: session
                        .reason
                        .map(|reason| reason.to_string())
                        .unwrap_or_else(|| "session was not established".to_string()),
                })
            }
            Err(error) => {
                let _ = channel.close_transport().await;
                Err(ClientError::Establishment {
                    reason: error.to_string(),
                })
            }
        }
    }
}

/// Background listener: feeds the mux from the active channel and
/// re-establishes the session whenever the channel tears down.
async fn listen(inner: Arc<ClientInner>) {
    loop {
        let channel = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            result = inner.acquire_channel() => match result {
                Ok(channel) => channel,
                Err(_) => break,
            }
        };
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = inner.mux.listen(channel) => {
                debug!("session ended, listener will re-establish");
            }
        }
    }
}
