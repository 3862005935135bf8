//! Seam between the transport and whatever protocol runs on a session.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::TransportError;
use crate::session::Session;
use crate::shim::SessionShim;

/// Runs for the lifetime of one session.
///
/// The push handler spawns `run` once the handshake event is out, and closes
/// the session when it returns. Implementations should return once
/// [`SessionShim::read`] yields `None`.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Serve `session` until its shim reaches end of stream.
    async fn run(&self, session: Arc<Session>, shim: SessionShim);
}

/// Echoes every inbound message back on the push stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl SessionHandler for EchoHandler {
    async fn run(&self, _session: Arc<Session>, mut shim: SessionShim) {
        while let Some(message) = shim.read().await {
            match shim.write(message).await {
                Ok(()) => {}
                Err(TransportError::BadRequest(reason)) => {
                    warn!(session_id = %shim.session_id(), %reason, "message not echoed");
                }
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::registry::SessionRegistry;

    #[tokio::test]
    async fn echo_round_trips_until_close() {
        let registry = Arc::new(SessionRegistry::default());
        let (session, channels) = registry.create().unwrap();
        assert!(session.activate());
        let mut outbound = channels.outbound;

        let task = tokio::spawn({
            let session = session.clone();
            async move { EchoHandler.run(session, channels.shim).await }
        });

        session.deliver(Message::from(r#"{"n":1}"#)).unwrap();
        session.deliver(Message::from(r#"{"n":2}"#)).unwrap();
        assert_eq!(outbound.next().await.unwrap().text(), r#"{"n":1}"#);
        assert_eq!(outbound.next().await.unwrap().text(), r#"{"n":2}"#);

        assert!(registry.close(&session.id()));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn echo_skips_messages_it_cannot_push() {
        let registry = Arc::new(SessionRegistry::default());
        let (session, channels) = registry.create().unwrap();
        assert!(session.activate());
        let mut outbound = channels.outbound;

        let task = tokio::spawn({
            let session = session.clone();
            async move { EchoHandler.run(session, channels.shim).await }
        });

        session.deliver(Message::from("{\r\n}")).unwrap();
        session.deliver(Message::from(r#"{"n":2}"#)).unwrap();
        assert_eq!(outbound.next().await.unwrap().text(), r#"{"n":2}"#);

        assert!(registry.close(&session.id()));
        task.await.unwrap();
    }
}
