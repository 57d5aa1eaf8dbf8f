//! Byte-stream transport with newline-delimited JSON framing.
//!
//! Wraps any `AsyncRead + AsyncWrite` stream (a TCP socket, a TLS stream,
//! an in-memory duplex) into a [`Transport`]: one envelope per line,
//! serialized as JSON. The stream is split into read and write halves so
//! the channel's receiver and sender workers operate concurrently.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

// Layer 3: Internal module imports
use crate::protocol::{Envelope, SessionCompression, SessionEncryption};

use super::{Transport, TransportError};

/// Default cap on a single serialized envelope
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Newline-delimited JSON codec for envelopes
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_frame_length: usize,
}

impl EnvelopeCodec {
    /// Create a codec with the given frame cap
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, TransportError> {
        let Some(newline) = src.iter().position(|byte| *byte == b'\n') else {
            if src.len() > self.max_frame_length {
                return Err(TransportError::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "envelope frame exceeds the configured maximum",
                    ),
                });
            }
            return Ok(None);
        };
        let line = src.split_to(newline + 1);
        let frame = &line[..newline];
        if frame.is_empty() {
            return self.decode(src);
        }
        Ok(Some(Envelope::from_bytes(frame).map_err(|error| {
            TransportError::Io {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string()),
            }
        })?))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = TransportError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<(), TransportError> {
        envelope
            .serialize_to_buffer(dst)
            .map_err(|error| TransportError::Io {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string()),
            })?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// A [`Transport`] over any byte stream, one JSON envelope per line.
///
/// Compression and encryption are left to the wrapped stream (a TLS
/// stream is already encrypted); only `none` is negotiable here.
pub struct StreamTransport<S: AsyncRead + AsyncWrite + Send + 'static> {
    reader: Mutex<FramedRead<ReadHalf<S>, EnvelopeCodec>>,
    writer: Mutex<FramedWrite<WriteHalf<S>, EnvelopeCodec>>,
    open: AtomicBool,
}

impl<S: AsyncRead + AsyncWrite + Send + 'static> StreamTransport<S> {
    /// Wrap a byte stream with the default codec
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, EnvelopeCodec::default())
    }

    /// Wrap a byte stream with an explicit codec configuration
    pub fn with_codec(stream: S, codec: EnvelopeCodec) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(FramedRead::new(read_half, codec.clone())),
            writer: Mutex::new(FramedWrite::new(write_half, codec)),
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send + 'static> Transport for StreamTransport<S> {
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.send(envelope.clone()).await
    }

    async fn receive(&self) -> Result<Envelope, TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(result) => result,
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self
            .open
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TransportError::NotOpen);
        }
        let mut writer = self.writer.lock().await;
        writer.close().await
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
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
