//! Per-connection session state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::ids::SessionId;
use crate::message::Message;

/// Lifecycle of a session.
///
/// `Created → Active → Closing → Closed`. `Closed` is terminal and the id is
/// never handed out again by the same registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    /// Allocated, handshake not yet sent.
    Created = 0,
    /// Handshake sent; intake accepted.
    Active = 1,
    /// Teardown in progress.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl SessionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// One logical duplex connection.
///
/// Holds the producer end of the inbound queue (fed by intake) and the
/// cancellation token shared with both queue consumers.
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    opened: Instant,
    status: AtomicU8,
    inbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        inbound: mpsc::Sender<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            opened: Instant::now(),
            status: AtomicU8::new(SessionStatus::Created as u8),
            inbound,
            cancel,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time since creation.
    pub fn age(&self) -> Duration {
        self.opened.elapsed()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Whether intake may deliver to this session.
    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Move `Created → Active`. Returns `false` if the session was not in
    /// `Created` (already active, or torn down before the handshake).
    pub fn activate(&self) -> bool {
        self.status
            .compare_exchange(
                SessionStatus::Created as u8,
                SessionStatus::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closing` and cancel both queues. Returns `true` for the
    /// caller that performed the transition.
    pub(crate) fn begin_close(&self) -> bool {
        let prev = self.status.fetch_max(SessionStatus::Closing as u8, Ordering::AcqRel);
        if prev >= SessionStatus::Closing as u8 {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub(crate) fn finish_close(&self) {
        self.status.store(SessionStatus::Closed as u8, Ordering::Release);
    }

    /// Token cancelled when the session closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the session has begun closing.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Enqueue a client message onto the inbound queue without waiting.
    ///
    /// Concurrent callers are serialized by the channel, so per-session order
    /// is the order in which calls reach this point.
    pub fn deliver(&self, message: Message) -> Result<(), TransportError> {
        if !self.is_active() {
            return Err(TransportError::not_found(&self.id));
        }
        match self.inbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::SessionOverloaded(format!(
                "inbound queue full for session {}",
                self.id
            ))),
            Err(TrySendError::Closed(_)) => Err(TransportError::not_found(&self.id)),
        }
    }

    /// Free slots left on the inbound queue.
    pub fn inbound_capacity(&self) -> usize {
        self.inbound.capacity()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
