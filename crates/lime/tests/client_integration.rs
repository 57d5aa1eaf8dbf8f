//! Supervised client and server scenarios: backoff, reconnection and
//! graceful shutdown.

mod common;

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lime::client::{Client, ClientBuilder};
use lime::protocol::{Command, CommandMethod, CommandStatus, Document, LimeUri, Message};
use lime::server::{Server, ServerBuilder};
use lime::transport::{
    PairConnector, PairListener, Transport, TransportError, TransportFactory,
};

use common::{client_identity, server_node};

/// Factory that rejects a configured number of dials before delegating
struct FlakyFactory {
    inner: PairConnector,
    remaining_failures: AtomicU32,
}

impl FlakyFactory {
    fn new(inner: PairConnector, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl TransportFactory for FlakyFactory {
    async fn dial(&self) -> Result<Box<dyn Transport>, TransportError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Io {
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.inner.dial().await
    }
}

fn start_server(established: Arc<AtomicUsize>, finished: Arc<AtomicUsize>) -> (Server, PairConnector) {
    common::init_tracing();
    let (listener, connector) = PairListener::new(8);
    let server = ServerBuilder::new(server_node())
        .listener(Arc::new(listener))
        .auto_ping()
        .on_established(Arc::new(move |_session_id, _channel| {
            established.fetch_add(1, Ordering::SeqCst);
        }))
        .on_finished(Arc::new(move |_session_id| {
            finished.fetch_add(1, Ordering::SeqCst);
        }))
        .build();
    (server, connector)
}

fn build_client(factory: Arc<dyn TransportFactory>) -> Client {
    ClientBuilder::new(client_identity(), factory)
        .instance("home")
        .command_timeout(Duration::from_secs(5))
        .finish_timeout(Duration::from_millis(500))
        .build()
}

#[tokio::test]
async fn test_client_ping_through_server() {
    let established = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (server, connector) = start_server(Arc::clone(&established), Arc::clone(&finished));
    let server = Arc::new(server);
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let client = build_client(Arc::new(connector));
    let request = Command::new_request(CommandMethod::Get, LimeUri::ping());
    let response = client.process_command(request).await.unwrap();
    assert_eq!(response.status, Some(CommandStatus::Success));
    assert_eq!(established.load(Ordering::SeqCst), 1);

    client.close().await.unwrap();
    server.close().await.unwrap();
    serving.await.unwrap().unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_on_rejected_dials() {
    // Two rejected dials cost 0 + 100 + 400 ms of backoff
    let established = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (server, connector) = start_server(Arc::clone(&established), Arc::clone(&finished));
    let server = Arc::new(server);
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let factory = Arc::new(FlakyFactory::new(connector, 2));
    let client = build_client(factory);

    let start = tokio::time::Instant::now();
    client.establish().await.unwrap();
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(600),
        "expected about 500ms of backoff, got {elapsed:?}"
    );

    client.close().await.unwrap();
    server.close().await.unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_backoff_cancels_send() {
    // Every dial fails, so the caller's deadline fires and nothing is sent
    let established = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (server, connector) = start_server(Arc::clone(&established), Arc::clone(&finished));
    let server = Arc::new(server);
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let factory = Arc::new(FlakyFactory::new(connector, u32::MAX));
    let client = build_client(factory);

    let message = Message::new(Document::text_plain("never"));
    let result =
        tokio::time::timeout(Duration::from_millis(250), client.send_message(message)).await;
    assert!(result.is_err(), "the deadline must fire, got {result:?}");
    assert_eq!(established.load(Ordering::SeqCst), 0);

    client.close().await.unwrap();
    server.close().await.unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_client_reestablishes_after_connection_loss() {
    let session_channels: Arc<std::sync::Mutex<Vec<Arc<lime::channel::Channel>>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let finished = Arc::new(AtomicUsize::new(0));

    common::init_tracing();
    let (listener, connector) = PairListener::new(8);
    let channels = Arc::clone(&session_channels);
    let on_finished = Arc::clone(&finished);
    let server = Arc::new(
        ServerBuilder::new(server_node())
            .listener(Arc::new(listener))
            .auto_ping()
            .on_established(Arc::new(move |_session_id, channel| {
                channels.lock().unwrap().push(Arc::clone(channel));
            }))
            .on_finished(Arc::new(move |_session_id| {
                on_finished.fetch_add(1, Ordering::SeqCst);
            }))
            .build(),
    );
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let client = build_client(Arc::new(connector));
    client.establish().await.unwrap();
    assert_eq!(session_channels.lock().unwrap().len(), 1);

    // Sever the first session from the server side
    let first = Arc::clone(&session_channels.lock().unwrap()[0]);
    first.finish_session().await.unwrap();

    // The next operation transparently builds a fresh session
    let request = Command::new_request(CommandMethod::Get, LimeUri::ping());
    let response = client.process_command(request).await.unwrap();
    assert_eq!(response.status, Some(CommandStatus::Success));
    assert_eq!(session_channels.lock().unwrap().len(), 2);

    client.close().await.unwrap();
    server.close().await.unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_close_finishes_session_gracefully() {
    let established = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (server, connector) = start_server(Arc::clone(&established), Arc::clone(&finished));
    let server = Arc::new(server);
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let client = build_client(Arc::new(connector));
    client.establish().await.unwrap();

    client.close().await.unwrap();

    server.close().await.unwrap();
    serving.await.unwrap().unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // Operations after close fail fast
    let message = Message::new(Document::text_plain("late"));
    assert!(client.send_message(message).await.is_err());
}
