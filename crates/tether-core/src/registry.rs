//! Lifecycle-scoped table of live sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::TransportError;
use crate::ids::SessionId;
use crate::metric_names::{
    SESSION_DURATION_SECONDS, SESSIONS_ACTIVE, SESSIONS_CLOSED_TOTAL, SESSIONS_OPENED_TOTAL,
};
use crate::session::Session;
use crate::shim::{OutboundQueue, SessionShim, ShimReader, ShimWriter};

/// Sizing knobs for sessions created by a registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Upper bound on concurrently open sessions.
    pub max_sessions: usize,
    /// Capacity of each direction's queue.
    pub queue_capacity: usize,
    /// How long an outbound write may wait for queue room.
    pub write_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            queue_capacity: 256,
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a freshly created session hands to its two consumers.
pub struct SessionChannels {
    /// Duplex endpoint for the RPC layer.
    pub shim: SessionShim,
    /// Outbound consumer for the push stream.
    pub outbound: OutboundQueue,
}

impl std::fmt::Debug for SessionChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionChannels").finish_non_exhaustive()
    }
}

/// Maps session ids to live sessions.
///
/// Inject one instance into both HTTP handlers; independent registries never
/// see each other's sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    config: RegistryConfig,
    parent: CancellationToken,
    open: AtomicUsize,
}

impl SessionRegistry {
    /// Create a registry whose sessions are cancelled only individually.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_parent(config, CancellationToken::new())
    }

    /// Create a registry whose sessions are all cancelled with `parent`.
    pub fn with_parent(config: RegistryConfig, parent: CancellationToken) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            parent,
            open: AtomicUsize::new(0),
        }
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether the parent token is cancelled, so `create` refuses everything.
    pub fn is_shutting_down(&self) -> bool {
        self.parent.is_cancelled()
    }

    /// Allocate a fresh session in `Created` state.
    ///
    /// Fails with `SessionOverloaded` at `max_sessions` or once the parent
    /// token is cancelled.
    pub fn create(&self) -> Result<(Arc<Session>, SessionChannels), TransportError> {
        if self.parent.is_cancelled() {
            return Err(TransportError::SessionOverloaded("server is shutting down".into()));
        }
        let reserved = self.open.fetch_add(1, Ordering::AcqRel);
        if reserved >= self.config.max_sessions {
            let _ = self.open.fetch_sub(1, Ordering::AcqRel);
            warn!(max_sessions = self.config.max_sessions, "session limit reached");
            return Err(TransportError::SessionOverloaded(format!(
                "max sessions reached ({})",
                self.config.max_sessions
            )));
        }

        let capacity = self.config.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let cancel = self.parent.child_token();

        let session = loop {
            let id = SessionId::generate();
            match self.sessions.entry(id) {
                Entry::Occupied(_) => {
                    warn!(session_id = %id, "session id collision, regenerating");
                }
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session::new(id, inbound_tx, cancel.clone()));
                    let _ = slot.insert(session.clone());
                    break session;
                }
            }
        };

        let id = session.id();
        let channels = SessionChannels {
            shim: SessionShim::new(
                ShimReader::new(id, inbound_rx, cancel.clone()),
                ShimWriter::new(id, outbound_tx, cancel.clone(), self.config.write_timeout),
            ),
            outbound: OutboundQueue::new(id, outbound_rx, cancel),
        };

        counter!(SESSIONS_OPENED_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        debug!(session_id = %id, "session created");
        Ok((session, channels))
    }

    /// Fetch an active session.
    pub fn lookup(&self, id: &SessionId) -> Result<Arc<Session>, TransportError> {
        match self.sessions.get(id) {
            Some(entry) if entry.is_active() => Ok(entry.value().clone()),
            _ => Err(TransportError::not_found(id)),
        }
    }

    /// Fetch an active session by its wire form. Malformed ids are reported
    /// as not found.
    pub fn lookup_str(&self, raw: &str) -> Result<Arc<Session>, TransportError> {
        let id: SessionId = raw
            .parse()
            .map_err(|_| TransportError::SessionNotFound(raw.to_owned()))?;
        self.lookup(&id)
    }

    /// Tear a session down: cancel its queues and drop it from the table.
    ///
    /// Idempotent; returns `true` only for the call that removed the entry.
    pub fn close(&self, id: &SessionId) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        let _ = session.begin_close();
        session.finish_close();
        let _ = self.open.fetch_sub(1, Ordering::AcqRel);

        counter!(SESSIONS_CLOSED_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        histogram!(SESSION_DURATION_SECONDS).record(session.age().as_secs_f64());
        info!(session_id = %id, age_ms = session.age().as_millis(), "session closed");
        true
    }

    /// Close every session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let ids = self.ids();
        ids.iter().filter(|id| self.close(id)).count()
    }

    /// Ids of every session in the table, in no particular order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    /// Number of sessions in the table.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;

    use super::*;
    use crate::message::Message;
    use crate::session::SessionStatus;

    fn registry_with(max_sessions: usize, queue_capacity: usize) -> SessionRegistry {
        SessionRegistry::new(RegistryConfig {
            max_sessions,
            queue_capacity,
            write_timeout: Duration::from_secs(1),
        })
    }

    #[test]
    fn create_then_lookup_after_activation() {
        let registry = SessionRegistry::default();
        let (session, _channels) = registry.create().unwrap();
        assert_eq!(session.status(), SessionStatus::Created);
        assert_matches!(registry.lookup(&session.id()), Err(TransportError::SessionNotFound(_)));

        assert!(session.activate());
        let found = registry.lookup(&session.id()).unwrap();
        assert_eq!(found.id(), session.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_unknown_and_malformed() {
        let registry = SessionRegistry::default();
        assert_matches!(
            registry.lookup(&SessionId::generate()),
            Err(TransportError::SessionNotFound(_))
        );
        assert_matches!(registry.lookup_str("abc123"), Err(TransportError::SessionNotFound(_)));
    }

    #[test]
    fn lookup_str_finds_active_session() {
        let registry = SessionRegistry::default();
        let (session, _channels) = registry.create().unwrap();
        assert!(session.activate());
        let found = registry.lookup_str(&session.id().to_string()).unwrap();
        assert_eq!(found.id(), session.id());
    }

    #[test]
    fn close_removes_and_is_idempotent() {
        let registry = SessionRegistry::default();
        let (session, _channels) = registry.create().unwrap();
        assert!(session.activate());
        let id = session.id();

        assert!(registry.close(&id));
        assert!(!registry.close(&id));
        assert!(registry.is_empty());
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_matches!(registry.lookup(&id), Err(TransportError::SessionNotFound(_)));
        assert_matches!(
            session.deliver(Message::from("{}")),
            Err(TransportError::SessionNotFound(_))
        );
    }

    #[tokio::test]
    async fn close_wakes_reader_and_push_consumer() {
        let registry = Arc::new(SessionRegistry::default());
        let (session, channels) = registry.create().unwrap();
        assert!(session.activate());
        let SessionChannels { shim, mut outbound } = channels;
        let (mut reader, _writer) = shim.split();

        let read = tokio::spawn(async move { reader.read().await });
        let drain = tokio::spawn(async move { outbound.next().await });
        tokio::task::yield_now().await;

        assert!(registry.close(&session.id()));
        let timeout = Duration::from_secs(1);
        assert!(tokio::time::timeout(timeout, read).await.unwrap().unwrap().is_none());
        assert!(tokio::time::timeout(timeout, drain).await.unwrap().unwrap().is_none());
    }

    #[test]
    fn max_sessions_enforced_and_released() {
        let registry = registry_with(2, 4);
        let (a, _ca) = registry.create().unwrap();
        let (_b, _cb) = registry.create().unwrap();
        assert_matches!(registry.create(), Err(TransportError::SessionOverloaded(_)));

        assert!(registry.close(&a.id()));
        assert!(registry.create().is_ok());
    }

    #[test]
    fn parent_cancellation_reaches_sessions() {
        let parent = CancellationToken::new();
        let registry = SessionRegistry::with_parent(RegistryConfig::default(), parent.clone());
        let (session, _channels) = registry.create().unwrap();
        assert!(!registry.is_shutting_down());
        parent.cancel();
        assert!(registry.is_shutting_down());
        assert!(session.cancellation().is_cancelled());
        assert_matches!(registry.create(), Err(TransportError::SessionOverloaded(_)));
    }

    #[test]
    fn close_all_empties_table() {
        let registry = SessionRegistry::default();
        let handles: Vec<_> = (0..5).map(|_| registry.create().unwrap()).collect();
        assert_eq!(registry.close_all(), 5);
        assert!(registry.is_empty());
        for (session, _) in &handles {
            assert_eq!(session.status(), SessionStatus::Closed);
        }
    }

    #[test]
    fn independent_registries_are_isolated() {
        let one = SessionRegistry::default();
        let two = SessionRegistry::default();
        let (session, _channels) = one.create().unwrap();
        assert!(session.activate());
        assert!(one.lookup(&session.id()).is_ok());
        assert_matches!(two.lookup(&session.id()), Err(TransportError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_creates_never_collide() {
        let registry = Arc::new(registry_with(20_000, 1));
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                (0..1_000)
                    .map(|_| {
                        let (session, channels) = registry.create().unwrap();
                        drop(channels);
                        session.id()
                    })
                    .collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for task in tasks {
            for id in task.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 10_000);
        assert_eq!(registry.len(), 10_000);
    }

    #[tokio::test]
    async fn one_session_failure_leaves_others_intact() {
        let registry = SessionRegistry::default();
        let (a, _ca) = registry.create().unwrap();
        let (b, cb) = registry.create().unwrap();
        assert!(a.activate());
        assert!(b.activate());

        assert!(registry.close(&a.id()));
        b.deliver(Message::from(r#"{"id":1}"#)).unwrap();
        let (mut reader, _writer) = cb.shim.split();
        assert_eq!(reader.read().await.unwrap().text(), r#"{"id":1}"#);
    }
}
