//! Channel Layer - Session-Bound Envelope Pipe
//!
//! A channel owns one transport and the session identity, and exposes
//! send/receive operations scoped by envelope family plus request/response
//! correlation. Once the session is established, two background workers own
//! the transport: the receiver demultiplexes inbound envelopes onto typed
//! queues and resolves pending command responses, the sender drains a
//! single outbound queue so egress has a total order. Entering a terminal
//! state cancels both workers and closes every queue, which consumers
//! observe as EOF.

// Module declarations
pub mod error;
pub(crate) mod pending;

// Public re-exports
pub use error::{ChannelError, ChannelResult};

// Layer 1: Standard library imports
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

// Layer 2: Third-party crate imports
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::protocol::{
    Command, Envelope, Message, Node, Notification, Reason, Session, SessionState,
};
use crate::transport::Transport;

use self::pending::PendingResponses;

/// Configuration for channel queue sizing
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Capacity of the outbound queue and of each typed inbound queue
    pub buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { buffer_size: 32 }
    }
}

/// Senders of the typed inbound queues, owned by the receiver worker once
/// the channel is established
#[derive(Clone)]
struct InboundSenders {
    messages: mpsc::Sender<Message>,
    notifications: mpsc::Sender<Notification>,
    commands: mpsc::Sender<Command>,
    responses: mpsc::Sender<Command>,
    sessions: mpsc::Sender<Session>,
    errors: mpsc::Sender<ChannelError>,
}

struct Workers {
    cancel: CancellationToken,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

/// A full-duplex envelope pipe bound to one transport and one session.
///
/// Created in the `New` state; the establishment procedure advances it to
/// `Established`, at which point the background workers start and the
/// typed send/receive operations become available.
pub struct Channel {
    transport: Arc<dyn Transport>,
    state: RwLock<SessionState>,
    session_id: RwLock<String>,
    local_node: RwLock<Option<Node>>,
    remote_node: RwLock<Option<Node>>,

    out_tx: mpsc::Sender<Envelope>,
    out_rx: StdMutex<Option<mpsc::Receiver<Envelope>>>,
    inbound: StdMutex<Option<InboundSenders>>,

    messages_rx: Mutex<mpsc::Receiver<Message>>,
    notifications_rx: Mutex<mpsc::Receiver<Notification>>,
    commands_rx: Mutex<mpsc::Receiver<Command>>,
    responses_rx: Mutex<mpsc::Receiver<Command>>,
    sessions_rx: Mutex<mpsc::Receiver<Session>>,
    errors_rx: Mutex<mpsc::Receiver<ChannelError>>,

    pending: PendingResponses,
    workers: Mutex<Option<Workers>>,
}

impl Channel {
    /// Create a client-role channel in the `New` state
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    /// Create a channel with explicit queue sizing
    pub fn with_config(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let capacity = config.buffer_size.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (messages_tx, messages_rx) = mpsc::channel(capacity);
        let (notifications_tx, notifications_rx) = mpsc::channel(capacity);
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (responses_tx, responses_rx) = mpsc::channel(capacity);
        let (sessions_tx, sessions_rx) = mpsc::channel(capacity);
        let (errors_tx, errors_rx) = mpsc::channel(capacity);

        Self {
            transport,
            state: RwLock::new(SessionState::New),
            session_id: RwLock::new(String::new()),
            local_node: RwLock::new(None),
            remote_node: RwLock::new(None),
            out_tx,
            out_rx: StdMutex::new(Some(out_rx)),
            inbound: StdMutex::new(Some(InboundSenders {
                messages: messages_tx,
                notifications: notifications_tx,
                commands: commands_tx,
                responses: responses_tx,
                sessions: sessions_tx,
                errors: errors_tx,
            })),
            messages_rx: Mutex::new(messages_rx),
            notifications_rx: Mutex::new(notifications_rx),
            commands_rx: Mutex::new(commands_rx),
            responses_rx: Mutex::new(responses_rx),
            sessions_rx: Mutex::new(sessions_rx),
            errors_rx: Mutex::new(errors_rx),
            pending: PendingResponses::default(),
            workers: Mutex::new(None),
        }
    }

    /// Create a server-role channel with a server-generated session id
    pub fn for_server(transport: Arc<dyn Transport>, session_id: impl Into<String>) -> Self {
        Self::for_server_with_config(transport, session_id, ChannelConfig::default())
    }

    /// Create a server-role channel with explicit queue sizing
    pub fn for_server_with_config(
        transport: Arc<dyn Transport>,
        session_id: impl Into<String>,
        config: ChannelConfig,
    ) -> Self {
        let channel = Self::with_config(transport, config);
        if let Ok(mut id) = channel.session_id.try_write() {
            *id = session_id.into();
        }
        channel
    }

    /// The current session state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// The session id assigned by the server, empty before establishment
    pub async fn session_id(&self) -> String {
        self.session_id.read().await.clone()
    }

    /// The local node address, known after establishment
    pub async fn local_node(&self) -> Option<Node> {
        self.local_node.read().await.clone()
    }

    /// The remote node address, known after establishment
    pub async fn remote_node(&self) -> Option<Node> {
        self.remote_node.read().await.clone()
    }

    /// True when the session is established and the transport is connected
    pub async fn is_established(&self) -> bool {
        *self.state.read().await == SessionState::Established && self.transport.is_connected()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) async fn set_session_id(&self, id: impl Into<String>) {
        *self.session_id.write().await = id.into();
    }

    pub(crate) async fn set_local_node(&self, node: Option<Node>) {
        *self.local_node.write().await = node;
    }

    pub(crate) async fn set_remote_node(&self, node: Option<Node>) {
        *self.remote_node.write().await = node;
    }

    pub(crate) async fn close_transport(&self) -> ChannelResult<()> {
        self.transport.close().await.map_err(Into::into)
    }

    /// Advance the session state.
    ///
    /// States are totally ordered; a regression attempt fails and leaves
    /// the state unchanged. Entering `Established` starts the background
    /// workers; entering a terminal state cancels them and closes the
    /// typed queues.
    pub async fn set_state(&self, state: SessionState) -> ChannelResult<()> {
        {
            let mut current = self.state.write().await;
            if state.step() < current.step() {
                return Err(ChannelError::StateRegression {
                    current: *current,
                    requested: state,
                });
            }
            trace!(from = %*current, to = %state, "session state transition");
            *current = state;
        }
        match state {
            SessionState::Established => self.start_workers().await,
            state if state.is_terminal() => self.stop_workers().await,
            _ => {}
        }
        Ok(())
    }

    async fn start_workers(&self) {
        let out_rx = self.out_rx.lock().ok().and_then(|mut guard| guard.take());
        let inbound = self.inbound.lock().ok().and_then(|mut guard| guard.take());
        let (Some(out_rx), Some(inbound)) = (out_rx, inbound) else {
            return;
        };

        let cancel = CancellationToken::new();
        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&self.transport),
            inbound.clone(),
            self.pending.clone(),
            cancel.clone(),
        ));
        let sender = tokio::spawn(send_loop(
            Arc::clone(&self.transport),
            out_rx,
            inbound.errors.clone(),
            cancel.clone(),
        ));
        *self.workers.lock().await = Some(Workers {
            cancel,
            receiver,
            sender,
        });
        debug!("channel workers started");
    }

    async fn stop_workers(&self) {
        let workers = self.workers.lock().await.take();
        if let Some(workers) = workers {
            workers.cancel.cancel();
            let _ = workers.receiver.await;
            let _ = workers.sender.await;
            debug!("channel workers stopped");
        } else {
            // Terminal before establishment: release the queue endpoints the
            // workers would have owned so consumers observe EOF.
            if let Ok(mut guard) = self.inbound.lock() {
                guard.take();
            }
            if let Ok(mut guard) = self.out_rx.lock() {
                guard.take();
            }
        }
        self.pending.clear();
    }

    async fn ensure_established(&self) -> ChannelResult<()> {
        if !self.transport.is_connected() {
            return Err(ChannelError::TransportNotConnected);
        }
        let state = *self.state.read().await;
        if state != SessionState::Established {
            return Err(ChannelError::WrongState {
                expected: SessionState::Established,
                actual: state,
            });
        }
        Ok(())
    }

    async fn enqueue_outbound(&self, envelope: Envelope) -> ChannelResult<()> {
        self.ensure_established().await?;
        self.out_tx
            .send(envelope)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Send a message envelope; requires the `Established` state
    pub async fn send_message(&self, message: Message) -> ChannelResult<()> {
        self.enqueue_outbound(message.into()).await
    }

    /// Send a notification envelope; requires the `Established` state
    pub async fn send_notification(&self, notification: Notification) -> ChannelResult<()> {
        self.enqueue_outbound(notification.into()).await
    }

    /// Send a command envelope; requires the `Established` state
    pub async fn send_command(&self, command: Command) -> ChannelResult<()> {
        self.enqueue_outbound(command.into()).await
    }

    /// Block until the next inbound message, or EOF
    pub async fn receive_message(&self) -> ChannelResult<Message> {
        let mut queue = self.messages_rx.lock().await;
        queue.recv().await.ok_or(ChannelError::Closed)
    }

    /// Block until the next inbound notification, or EOF
    pub async fn receive_notification(&self) -> ChannelResult<Notification> {
        let mut queue = self.notifications_rx.lock().await;
        queue.recv().await.ok_or(ChannelError::Closed)
    }

    /// Block until the next inbound command request, or EOF
    pub async fn receive_command(&self) -> ChannelResult<Command> {
        let mut queue = self.commands_rx.lock().await;
        queue.recv().await.ok_or(ChannelError::Closed)
    }

    /// Block until the next inbound command response that no pending
    /// request claimed, or EOF
    pub async fn receive_response(&self) -> ChannelResult<Command> {
        let mut queue = self.responses_rx.lock().await;
        queue.recv().await.ok_or(ChannelError::Closed)
    }

    /// Block until the next background worker error, or EOF
    pub async fn receive_error(&self) -> ChannelResult<ChannelError> {
        let mut queue = self.errors_rx.lock().await;
        queue.recv().await.ok_or(ChannelError::Closed)
    }

    /// Send a session envelope.
    ///
    /// Before establishment this writes directly to the transport, since
    /// the handshake owns it single-threaded; once established the workers
    /// own the transport and the envelope goes through the outbound queue.
    pub async fn send_session(&self, session: Session) -> ChannelResult<()> {
        let state = *self.state.read().await;
        if state.is_terminal() {
            return Err(ChannelError::Closed);
        }
        if state == SessionState::Established {
            return self
                .out_tx
                .send(session.into())
                .await
                .map_err(|_| ChannelError::Closed);
        }
        if !self.transport.is_connected() {
            return Err(ChannelError::TransportNotConnected);
        }
        self.transport
            .send(&Envelope::Session(session))
            .await
            .map_err(Into::into)
    }

    /// Receive a session envelope, using the same dual path as
    /// [`Channel::send_session`]
    pub async fn receive_session(&self) -> ChannelResult<Session> {
        let state = *self.state.read().await;
        if state.is_terminal() {
            return Err(ChannelError::Closed);
        }
        if state == SessionState::Established {
            let mut queue = self.sessions_rx.lock().await;
            return queue.recv().await.ok_or(ChannelError::Closed);
        }
        if !self.transport.is_connected() {
            return Err(ChannelError::TransportNotConnected);
        }
        match self.transport.receive().await? {
            Envelope::Session(session) => Ok(session),
            _ => Err(ChannelError::UnexpectedEnvelope {
                expected: "session",
            }),
        }
    }

    /// Send a command request and await its correlated response.
    ///
    /// The request must carry a non-empty id and no status, and no other
    /// request with the same id may be in flight. The registration is
    /// released on every exit path, including cancellation of this future.
    pub async fn process_command(&self, command: Command) -> ChannelResult<Command> {
        if command.header.id.is_empty() {
            return Err(ChannelError::EmptyCommandId);
        }
        if command.is_response() {
            return Err(ChannelError::UnexpectedCommandStatus);
        }
        self.ensure_established().await?;

        let (receiver, _guard) = self.pending.register(&command.header.id)?;
        self.out_tx
            .send(Envelope::Command(command))
            .await
            .map_err(|_| ChannelError::Closed)?;
        receiver.await.map_err(|_| ChannelError::Closed)
    }

    /// Gracefully terminate an established session.
    ///
    /// Transitions through `Finishing` to `Finished`, tears the workers
    /// down, then writes the `finished` envelope and closes the transport,
    /// so the peer observes `finished` followed by EOF.
    pub async fn finish_session(&self) -> ChannelResult<()> {
        {
            let state = *self.state.read().await;
            if state != SessionState::Established {
                return Err(ChannelError::WrongState {
                    expected: SessionState::Established,
                    actual: state,
                });
            }
        }
        self.set_state(SessionState::Finishing).await?;
        self.set_state(SessionState::Finished).await?;

        let mut session = Session::new(SessionState::Finished).with_id(self.session_id().await);
        session.header.from = self.local_node().await;
        self.transport.send(&Envelope::Session(session)).await?;
        self.transport.close().await?;
        Ok(())
    }

    /// Abort the session from any non-terminal state.
    ///
    /// The `failed` envelope is written best-effort before the transport
    /// is closed.
    pub async fn fail_session(&self, reason: Reason) -> ChannelResult<()> {
        {
            let state = *self.state.read().await;
            if state.is_terminal() {
                return Err(ChannelError::Closed);
            }
        }
        self.set_state(SessionState::Failed).await?;

        let mut session = Session::failed(reason).with_id(self.session_id().await);
        session.header.from = self.local_node().await;
        if let Err(error) = self.transport.send(&Envelope::Session(session)).await {
            debug!(%error, "failed envelope could not be sent");
        }
        let _ = self.transport.close().await;
        Ok(())
    }
}

async fn enqueue<T>(
    cancel: &CancellationToken,
    queue: &mpsc::Sender<T>,
    item: T,
) -> Result<(), ()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(()),
        result = queue.send(item) => result.map_err(|_| ()),
    }
}

async fn receive_loop(
    transport: Arc<dyn Transport>,
    queues: InboundSenders,
    pending: PendingResponses,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            result = transport.receive() => match result {
                Ok(envelope) => envelope,
                Err(error) => {
                    debug!(%error, "transport receive failed, stopping receiver");
                    let _ = queues.errors.try_send(error.into());
                    break;
                }
            }
        };

        let delivered = match envelope {
            Envelope::Message(message) => enqueue(&cancel, &queues.messages, message).await,
            Envelope::Notification(notification) => {
                enqueue(&cancel, &queues.notifications, notification).await
            }
            Envelope::Session(session) => enqueue(&cancel, &queues.sessions, session).await,
            Envelope::Command(command) => {
                if command.is_response() {
                    match pending.resolve(command) {
                        // A waiter claimed the response
                        None => Ok(()),
                        Some(unmatched) => enqueue(&cancel, &queues.responses, unmatched).await,
                    }
                } else {
                    enqueue(&cancel, &queues.commands, command).await
                }
            }
        };
        if delivered.is_err() {
            break;
        }
    }
    trace!("receiver worker exited");
}

async fn send_loop(
    transport: Arc<dyn Transport>,
    mut out_rx: mpsc::Receiver<Envelope>,
    errors: mpsc::Sender<ChannelError>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            item = out_rx.recv() => match item {
                Some(envelope) => envelope,
                None => break,
            }
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = transport.send(&envelope) => result,
        };
        if let Err(error) = result {
            debug!(%error, "transport send failed, stopping sender");
            let _ = errors.try_send(error.into());
            break;
        }
    }
    trace!("sender worker exited");
}
