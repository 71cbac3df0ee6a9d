//! Per-message adapters handed to the caller.
//!
//! [`MessageReader`] keeps the reader pump parked until it is dropped, so
//! messages are consumed strictly one at a time. [`MessageWriter`] holds the
//! session write lock for the whole lifetime of the message, so the bytes of
//! one packet are never interleaved with another writer's.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use engineio_client_core::{Packet, Str};
use tokio::sync::{OwnedMutexGuard, oneshot};

use crate::{Error, transport::Transport};

/// Whether a message carries text or binary data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A UTF-8 text message.
    Text,
    /// A binary message.
    Binary,
}

/// One inbound message.
///
/// The session delivers the next message only after this one is dropped.
#[derive(Debug)]
pub struct MessageReader {
    kind: MessageKind,
    payload: Bytes,
    release: Option<oneshot::Sender<()>>,
}

impl MessageReader {
    pub(crate) fn new(kind: MessageKind, payload: Bytes, release: oneshot::Sender<()>) -> Self {
        Self {
            kind,
            payload,
            release: Some(release),
        }
    }

    /// Whether the message is text or binary.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The raw message payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as a string, if it is valid UTF-8.
    /// Always succeeds for [`MessageKind::Text`] messages.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Consume the reader and keep the payload.
    /// The reader pump is released all the same.
    pub fn into_bytes(mut self) -> Bytes {
        std::mem::take(&mut self.payload)
    }
}

impl AsRef<[u8]> for MessageReader {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl Drop for MessageReader {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release.send(()).ok();
        }
    }
}

/// One outbound message under construction.
///
/// Dropping the writer without calling [`close`](MessageWriter::close)
/// abandons the message; nothing reaches the wire.
#[derive(Debug)]
pub struct MessageWriter {
    kind: MessageKind,
    buf: BytesMut,
    transport: Arc<Transport>,
    _guard: OwnedMutexGuard<()>,
}

impl MessageWriter {
    pub(crate) fn new(kind: MessageKind, transport: Arc<Transport>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            kind,
            buf: BytesMut::new(),
            transport,
            _guard: guard,
        }
    }

    /// Append bytes to the message payload.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Flush the message as a single packet and release the write lock.
    pub async fn close(self) -> Result<(), Error> {
        let packet = match self.kind {
            MessageKind::Text => {
                Packet::Message(Str::from_bytes(self.buf.freeze()).map_err(Error::Utf8)?)
            }
            MessageKind::Binary => Packet::Binary(self.buf.freeze()),
        };
        self.transport.send(packet).await?;
        Ok(())
    }
}
