//! In-process transport pair.
//!
//! Two connected [`PairTransport`] ends exchange envelopes over bounded
//! in-memory queues. The pair backs the integration tests and serves as the
//! reference [`Transport`] implementation; it supports no compression or
//! encryption beyond `none`.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

// Layer 3: Internal module imports
use crate::protocol::{Envelope, SessionCompression, SessionEncryption};

use super::{Transport, TransportError, TransportFactory, TransportListener};

/// Default queue capacity of a transport pair
pub const DEFAULT_PAIR_CAPACITY: usize = 32;

/// One end of an in-process transport pair.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::{Document, Envelope, Message};
/// use lime::transport::{PairTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), lime::transport::TransportError> {
/// let (left, right) = PairTransport::pair(8);
/// let envelope = Envelope::Message(Message::new(Document::text_plain("hi")));
/// left.send(&envelope).await?;
/// assert_eq!(right.receive().await?, envelope);
/// # Ok(())
/// # }
/// ```
pub struct PairTransport {
    outbound: StdMutex<Option<mpsc::Sender<Envelope>>>,
    inbound: Mutex<mpsc::Receiver<Envelope>>,
    open: AtomicBool,
}

impl PairTransport {
    /// Create a connected pair with the given queue capacity per direction
    pub fn pair(capacity: usize) -> (PairTransport, PairTransport) {
        let (left_tx, right_rx) = mpsc::channel(capacity.max(1));
        let (right_tx, left_rx) = mpsc::channel(capacity.max(1));
        (
            PairTransport::end(left_tx, left_rx),
            PairTransport::end(right_tx, right_rx),
        )
    }

    fn end(tx: mpsc::Sender<Envelope>, rx: mpsc::Receiver<Envelope>) -> Self {
        Self {
            outbound: StdMutex::new(Some(tx)),
            inbound: Mutex::new(rx),
            open: AtomicBool::new(true),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Envelope>, TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for PairTransport {
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let sender = self.sender()?;
        sender
            .send(envelope.clone())
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Result<Envelope, TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self
            .open
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TransportError::NotOpen);
        }
        // Dropping the sender delivers EOF to the peer; closing the receiver
        // rejects anything the peer still tries to send.
        if let Ok(mut guard) = self.outbound.lock() {
            guard.take();
        }
        self.inbound.lock().await.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        match self.outbound.lock() {
            Ok(guard) => guard.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn supported_compression(&self) -> Vec<SessionCompression> {
        vec![SessionCompression::None]
    }

    fn supported_encryption(&self) -> Vec<SessionEncryption> {
        vec![SessionEncryption::None]
    }

    fn compression(&self) -> SessionCompression {
        SessionCompression::None
    }

    fn encryption(&self) -> SessionEncryption {
        SessionEncryption::None
    }

    async fn set_compression(
        &self,
        compression: SessionCompression,
    ) -> Result<(), TransportError> {
        match compression {
            SessionCompression::None => Ok(()),
            other => Err(TransportError::unsupported_option(other.to_string())),
        }
    }

    async fn set_encryption(&self, encryption: SessionEncryption) -> Result<(), TransportError> {
        match encryption {
            SessionEncryption::None => Ok(()),
            other => Err(TransportError::unsupported_option(other.to_string())),
        }
    }
}

/// Server half of an in-process listener: yields the peer end of every
/// transport pair dialed through the matching [`PairConnector`].
pub struct PairListener {
    incoming: Mutex<mpsc::Receiver<PairTransport>>,
    open: AtomicBool,
}

/// Client half of an in-process listener
#[derive(Clone)]
pub struct PairConnector {
    dispatch: mpsc::Sender<PairTransport>,
    capacity: usize,
}

impl PairListener {
    /// Create a connected listener/connector pair with the given accept
    /// backlog
    pub fn new(backlog: usize) -> (PairListener, PairConnector) {
        let (dispatch, incoming) = mpsc::channel(backlog.max(1));
        (
            PairListener {
                incoming: Mutex::new(incoming),
                open: AtomicBool::new(true),
            },
            PairConnector {
                dispatch,
                capacity: DEFAULT_PAIR_CAPACITY,
            },
        )
    }
}

#[async_trait]
impl TransportListener for PairListener {
    async fn accept(&self) -> Result<Box<dyn Transport>, TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        let mut incoming = self.incoming.lock().await;
        let transport = incoming.recv().await.ok_or(TransportError::Closed)?;
        Ok(Box::new(transport))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self
            .open
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TransportError::NotOpen);
        }
        self.incoming.lock().await.close();
        Ok(())
    }
}

#[async_trait]
impl TransportFactory for PairConnector {
    async fn dial(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (client_end, server_end) = PairTransport::pair(self.capacity);
        self.dispatch
            .send(server_end)
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(Box::new(client_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Document, Message};

    fn text_envelope(text: &str) -> Envelope {
        Envelope::Message(Message::new(Document::text_plain(text)))
    }

    #[tokio::test]
    async fn test_send_receive_both_directions() {
        let (left, right) = PairTransport::pair(4);
        tokio_test::assert_ok!(left.send(&text_envelope("ping")).await,);
        tokio_test::assert_ok!(right.send(&text_envelope("pong")).await,);

        assert_eq!(right.receive().await.unwrap(), text_envelope("ping"));
        assert_eq!(left.receive().await.unwrap(), text_envelope("pong"));
    }

    #[tokio::test]
    async fn test_close_is_observed_as_eof() {
        let (left, right) = PairTransport::pair(4);
        left.close().await.unwrap();
        assert!(matches!(
            right.receive().await.unwrap_err(),
            TransportError::Closed
        ));
        assert!(matches!(
            right.send(&text_envelope("x")).await.unwrap_err(),
            TransportError::Closed
        ));
    }

    #[tokio::test]
    async fn test_double_close_returns_not_open() {
        let (left, _right) = PairTransport::pair(4);
        left.close().await.unwrap();
        assert!(matches!(
            left.close().await.unwrap_err(),
            TransportError::NotOpen
        ));
    }

    #[tokio::test]
    async fn test_send_after_local_close_fails() {
        let (left, _right) = PairTransport::pair(4);
        left.close().await.unwrap();
        assert!(matches!(
            left.send(&text_envelope("x")).await.unwrap_err(),
            TransportError::Closed
        ));
        assert!(!left.is_connected());
    }

    #[tokio::test]
    async fn test_only_none_options_supported() {
        let (left, _right) = PairTransport::pair(4);
        assert_eq!(left.supported_compression(), vec![SessionCompression::None]);
        left.set_compression(SessionCompression::None).await.unwrap();
        assert!(left.set_compression(SessionCompression::Gzip).await.is_err());
        assert!(left.set_encryption(SessionEncryption::Tls).await.is_err());
    }

    #[tokio::test]
    async fn test_listener_accepts_dialed_transports() {
        let (listener, connector) = PairListener::new(4);

        let client = connector.dial().await.unwrap();
        let server = listener.accept().await.unwrap();

        client.send(&text_envelope("hello")).await.unwrap();
        assert_eq!(server.receive().await.unwrap(), text_envelope("hello"));
    }

    #[tokio::test]
    async fn test_closed_listener_rejects_dial_and_accept() {
        let (listener, connector) = PairListener::new(4);
        listener.close().await.unwrap();

        assert!(connector.dial().await.is_err());
        assert!(listener.accept().await.is_err());
    }
}
