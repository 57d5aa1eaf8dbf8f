//! Mux Layer - Predicate-Dispatched Envelope Handlers
//!
//! The mux owns ordered `(predicate, handler)` registrations per envelope
//! family and drives one consumer loop per typed channel queue. The first
//! handler whose predicate matches is invoked with the envelope and a
//! narrow [`EnvelopeSender`] capability targeting the same channel; an
//! unmatched envelope is discarded, and a handler error is logged without
//! stopping the loop. [`EnvelopeMux::listen`] returns when every queue has
//! reached EOF.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use futures::join;
use tracing::{trace, warn};

// Layer 3: Internal module imports
use crate::channel::{Channel, ChannelError, ChannelResult};
use crate::protocol::{Command, CommandMethod, Document, LimeUri, Message, Notification};

/// Capability to send envelopes back on the channel a handler was invoked
/// for. Handed to handlers instead of the channel itself.
#[async_trait]
pub trait EnvelopeSender: Send + Sync {
    /// Send a message on the originating channel
    async fn send_message(&self, message: Message) -> ChannelResult<()>;

    /// Send a notification on the originating channel
    async fn send_notification(&self, notification: Notification) -> ChannelResult<()>;

    /// Send a command on the originating channel
    async fn send_command(&self, command: Command) -> ChannelResult<()>;
}

#[async_trait]
impl EnvelopeSender for Channel {
    async fn send_message(&self, message: Message) -> ChannelResult<()> {
        Channel::send_message(self, message).await
    }

    async fn send_notification(&self, notification: Notification) -> ChannelResult<()> {
        Channel::send_notification(self, notification).await
    }

    async fn send_command(&self, command: Command) -> ChannelResult<()> {
        Channel::send_command(self, command).await
    }
}

/// Selects which messages a handler receives
pub type MessagePredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Selects which notifications a handler receives
pub type NotificationPredicate = Arc<dyn Fn(&Notification) -> bool + Send + Sync>;

/// Selects which commands a handler receives
pub type CommandPredicate = Arc<dyn Fn(&Command) -> bool + Send + Sync>;

/// Handles inbound messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message
    async fn handle(&self, message: Message, sender: &dyn EnvelopeSender) -> ChannelResult<()>;
}

/// Handles inbound notifications
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Process one notification
    async fn handle(
        &self,
        notification: Notification,
        sender: &dyn EnvelopeSender,
    ) -> ChannelResult<()>;
}

/// Handles inbound command requests
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Process one command request
    async fn handle(&self, command: Command, sender: &dyn EnvelopeSender) -> ChannelResult<()>;
}

/// Handles inbound command responses that no pending request claimed
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Process one unclaimed command response
    async fn handle(&self, response: Command, sender: &dyn EnvelopeSender) -> ChannelResult<()>;
}

/// Predicate matching every envelope of its family
pub fn any_message() -> MessagePredicate {
    Arc::new(|_| true)
}

/// Predicate matching every notification
pub fn any_notification() -> NotificationPredicate {
    Arc::new(|_| true)
}

/// Predicate matching every command
pub fn any_command() -> CommandPredicate {
    Arc::new(|_| true)
}

/// Auto-responder answering `get /ping` requests with an empty ping
/// resource
#[derive(Debug, Default, Clone, Copy)]
pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(&self, command: Command, sender: &dyn EnvelopeSender) -> ChannelResult<()> {
        let response = command.success_response_with_resource(Document::ping());
        sender.send_command(response).await
    }
}

/// Ordered handler registrations per envelope family.
///
/// Registrations happen before listening starts; the mux is then shared
/// immutably between the per-family consumer loops.
#[derive(Default)]
pub struct EnvelopeMux {
    messages: Vec<(MessagePredicate, Arc<dyn MessageHandler>)>,
    notifications: Vec<(NotificationPredicate, Arc<dyn NotificationHandler>)>,
    commands: Vec<(CommandPredicate, Arc<dyn CommandHandler>)>,
    responses: Vec<(CommandPredicate, Arc<dyn ResponseHandler>)>,
}

impl EnvelopeMux {
    /// Create an empty mux
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message handler behind a predicate
    pub fn register_message_handler(
        &mut self,
        predicate: MessagePredicate,
        handler: Arc<dyn MessageHandler>,
    ) {
        self.messages.push((predicate, handler));
    }

    /// Register a notification handler behind a predicate
    pub fn register_notification_handler(
        &mut self,
        predicate: NotificationPredicate,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notifications.push((predicate, handler));
    }

    /// Register a command-request handler behind a predicate
    pub fn register_command_handler(
        &mut self,
        predicate: CommandPredicate,
        handler: Arc<dyn CommandHandler>,
    ) {
        self.commands.push((predicate, handler));
    }

    /// Register a handler for unclaimed command responses
    pub fn register_response_handler(
        &mut self,
        predicate: CommandPredicate,
        handler: Arc<dyn ResponseHandler>,
    ) {
        self.responses.push((predicate, handler));
    }

    /// Register the `get /ping` auto-responder
    pub fn register_ping_handler(&mut self) {
        let predicate: CommandPredicate = Arc::new(|command: &Command| {
            command.method == CommandMethod::Get
                && command.uri.as_ref() == Some(&LimeUri::ping())
        });
        self.register_command_handler(predicate, Arc::new(PingHandler));
    }

    /// Drain the channel's typed queues, dispatching each envelope to the
    /// first handler whose predicate matches. Returns when every queue has
    /// reached EOF; cancel by dropping the returned future.
    pub async fn listen(&self, channel: Arc<Channel>) {
        join!(
            self.message_loop(&channel),
            self.notification_loop(&channel),
            self.command_loop(&channel),
            self.response_loop(&channel),
        );
        trace!("mux listen finished");
    }

    async fn message_loop(&self, channel: &Arc<Channel>) {
        while let Ok(message) = channel.receive_message().await {
            self.dispatch_message(message, channel.as_ref()).await;
        }
    }

    async fn notification_loop(&self, channel: &Arc<Channel>) {
        while let Ok(notification) = channel.receive_notification().await {
            self.dispatch_notification(notification, channel.as_ref()).await;
        }
    }

    async fn command_loop(&self, channel: &Arc<Channel>) {
        while let Ok(command) = channel.receive_command().await {
            self.dispatch_command(command, channel.as_ref()).await;
        }
    }

    async fn response_loop(&self, channel: &Arc<Channel>) {
        while let Ok(response) = channel.receive_response().await {
            self.dispatch_response(response, channel.as_ref()).await;
        }
    }

    async fn dispatch_message(&self, message: Message, sender: &dyn EnvelopeSender) {
        for (predicate, handler) in &self.messages {
            if predicate(&message) {
                if let Err(error) = handler.handle(message, sender).await {
                    log_handler_error("message", &error);
                }
                return;
            }
        }
        trace!("no handler matched, message discarded");
    }

    async fn dispatch_notification(
        &self,
        notification: Notification,
        sender: &dyn EnvelopeSender,
    ) {
        for (predicate, handler) in &self.notifications {
            if predicate(&notification) {
                if let Err(error) = handler.handle(notification, sender).await {
                    log_handler_error("notification", &error);
                }
                return;
            }
        }
        trace!("no handler matched, notification discarded");
    }

    async fn dispatch_command(&self, command: Command, sender: &dyn EnvelopeSender) {
        for (predicate, handler) in &self.commands {
            if predicate(&command) {
                if let Err(error) = handler.handle(command, sender).await {
                    log_handler_error("command", &error);
                }
                return;
            }
        }
        trace!("no handler matched, command discarded");
    }

    async fn dispatch_response(&self, response: Command, sender: &dyn EnvelopeSender) {
        for (predicate, handler) in &self.responses {
            if predicate(&response) {
                if let Err(error) = handler.handle(response, sender).await {
                    log_handler_error("response", &error);
                }
                return;
            }
        }
        trace!("no handler matched, response discarded");
    }
}

fn log_handler_error(family: &str, error: &ChannelError) {
    warn!(%family, %error, "envelope handler failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<Command>>,
    }

    #[async_trait]
    impl EnvelopeSender for RecordingSender {
        async fn send_message(&self, _message: Message) -> ChannelResult<()> {
            Ok(())
        }

        async fn send_notification(&self, _notification: Notification) -> ChannelResult<()> {
            Ok(())
        }

        async fn send_command(&self, command: Command) -> ChannelResult<()> {
            self.sent.lock().await.push(command);
            Ok(())
        }
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(
            &self,
            _message: Message,
            _sender: &dyn EnvelopeSender,
        ) -> ChannelResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn text_message(text: &str) -> Message {
        Message::new(Document::text_plain(text))
    }

    #[tokio::test]
    async fn test_first_matching_handler_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut mux = EnvelopeMux::new();
        mux.register_message_handler(
            any_message(),
            Arc::new(CountingHandler {
                calls: Arc::clone(&first),
            }),
        );
        mux.register_message_handler(
            any_message(),
            Arc::new(CountingHandler {
                calls: Arc::clone(&second),
            }),
        );

        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
        };
        mux.dispatch_message(text_message("x"), &sender).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmatched_message_discarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = EnvelopeMux::new();
        mux.register_message_handler(
            Arc::new(|_: &Message| false),
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
            }),
        );

        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
        };
        mux.dispatch_message(text_message("x"), &sender).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ping_handler_answers_get_ping() {
        let mut mux = EnvelopeMux::new();
        mux.register_ping_handler();

        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
        };
        let request = Command::new_request(CommandMethod::Get, LimeUri::ping());
        mux.dispatch_command(request.clone(), &sender).await;

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.id, request.header.id);
        assert!(sent[0].is_response());
        assert_eq!(
            sent[0].resource.as_ref().map(|d| d.media_type.to_string()),
            Some("application/vnd.lime.ping+json".to_string())
        );
    }

    #[tokio::test]
    async fn test_ping_handler_ignores_other_uris() {
        let mut mux = EnvelopeMux::new();
        mux.register_ping_handler();

        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
        };
        let request = Command::new_request(
            CommandMethod::Get,
            "/presence".parse().unwrap(),
        );
        mux.dispatch_command(request, &sender).await;
        assert!(sender.sent.lock().await.is_empty());
    }
}
