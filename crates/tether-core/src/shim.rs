//! The duplex shim handed to the RPC layer, and the outbound consumer
//! drained by the push stream.

use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::ids::SessionId;
use crate::message::Message;
use crate::metric_names::INBOUND_DISCARDED_TOTAL;

/// Readable + writable pair backed by a session's two queues.
///
/// To the layer above this behaves like a socket: `read` yields client
/// messages in arrival order and `write` queues server messages for the
/// push stream.
pub struct SessionShim {
    reader: ShimReader,
    writer: ShimWriter,
}

impl SessionShim {
    pub(crate) fn new(reader: ShimReader, writer: ShimWriter) -> Self {
        Self { reader, writer }
    }

    /// Session this shim belongs to.
    pub fn session_id(&self) -> SessionId {
        self.reader.session
    }

    /// Next inbound message, or `None` once the session is closed.
    pub async fn read(&mut self) -> Option<Message> {
        self.reader.read().await
    }

    /// Queue a message for the client.
    pub async fn write(&self, message: Message) -> Result<(), TransportError> {
        self.writer.write(message).await
    }

    /// Separate the halves so they can live on different tasks.
    pub fn split(self) -> (ShimReader, ShimWriter) {
        (self.reader, self.writer)
    }
}

/// Consumer end of the inbound queue.
pub struct ShimReader {
    session: SessionId,
    rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
    done: bool,
}

impl ShimReader {
    pub(crate) fn new(
        session: SessionId,
        rx: mpsc::Receiver<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            rx,
            cancel,
            done: false,
        }
    }

    /// Wait for the next client message.
    ///
    /// Returns `None` when the session closes. Anything still queued at that
    /// point is discarded and counted, never handed out after close.
    pub async fn read(&mut self) -> Option<Message> {
        if self.done {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.finish();
                None
            }
            msg = self.rx.recv() => {
                if msg.is_none() {
                    self.done = true;
                }
                msg
            }
        }
    }

    /// Whether end-of-stream has been observed.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    fn finish(&mut self) {
        self.done = true;
        self.rx.close();
        let mut discarded: u64 = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(session_id = %self.session, discarded, "discarded undelivered inbound messages");
            counter!(INBOUND_DISCARDED_TOTAL).increment(discarded);
        } else {
            debug!(session_id = %self.session, "inbound stream finished");
        }
    }
}

impl Drop for ShimReader {
    fn drop(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

/// Producer end of the outbound queue. Cheap to clone.
#[derive(Clone)]
pub struct ShimWriter {
    session: SessionId,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    write_timeout: Duration,
}

impl ShimWriter {
    pub(crate) fn new(
        session: SessionId,
        tx: mpsc::Sender<Message>,
        cancel: CancellationToken,
        write_timeout: Duration,
    ) -> Self {
        Self {
            session,
            tx,
            cancel,
            write_timeout,
        }
    }

    /// Queue a message, waiting up to the configured write timeout for room.
    ///
    /// Fails with `BadRequest` for a payload the push stream cannot carry
    /// verbatim (see [`Message::event_text`]), with `SessionOverloaded` if the
    /// queue stays full, and with `ConnectionLost` if the session closes first.
    pub async fn write(&self, message: Message) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::ConnectionLost(self.session));
        }
        let _ = message.event_text()?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(TransportError::ConnectionLost(self.session)),
            res = tokio::time::timeout(self.write_timeout, self.tx.send(message)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(TransportError::ConnectionLost(self.session)),
                Err(_elapsed) => Err(TransportError::SessionOverloaded(format!(
                    "outbound queue full for session {} after {:?}",
                    self.session, self.write_timeout
                ))),
            },
        }
    }

    /// Queue a message only if there is room right now.
    pub fn try_write(&self, message: Message) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::ConnectionLost(self.session));
        }
        let _ = message.event_text()?;
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::SessionOverloaded(format!(
                "outbound queue full for session {}",
                self.session
            ))),
            Err(TrySendError::Closed(_)) => Err(TransportError::ConnectionLost(self.session)),
        }
    }

    /// Serialize and queue a value.
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), TransportError> {
        let message = Message::to_json(value)
            .map_err(|e| TransportError::BadRequest(format!("unserializable message: {e}")))?;
        self.write(message).await
    }

    /// Whether the session has closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer end of the outbound queue, owned by the push stream.
pub struct OutboundQueue {
    session: SessionId,
    rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl OutboundQueue {
    pub(crate) fn new(
        session: SessionId,
        rx: mpsc::Receiver<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self { session, rx, cancel }
    }

    /// Session this queue belongs to.
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Next message for the client.
    ///
    /// `None` when the session is cancelled or every writer has been dropped.
    pub async fn next(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }
}
