//! Push endpoint: opens a session and streams its outbound messages as SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use metrics::counter;
use tether_core::metric_names::{MESSAGES_OUTBOUND_TOTAL, PUSH_REJECTED_TOTAL};
use tether_core::{SessionChannels, SessionId, SessionRegistry};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::server::AppState;

/// SSE event name for the handshake carrying the intake URL.
pub const ENDPOINT_EVENT: &str = "endpoint";
/// SSE event name for each outbound message.
pub const MESSAGE_EVENT: &str = "message";
/// Query parameter naming the session on intake.
pub const SESSION_ID_PARAM: &str = "session_id";

/// Closes its session when dropped.
///
/// Owned by the push stream, so every way the stream can end (client gone,
/// write failure, handler finished, shutdown) tears the session down.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    /// Guard session `id` in `registry`.
    pub fn new(registry: Arc<SessionRegistry>, id: SessionId) -> Self {
        Self { registry, id }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.close(&self.id) {
            debug!(session_id = %self.id, "push stream ended, session closed");
        }
    }
}

/// Intake URL advertised in the handshake, relative to the server root.
pub fn endpoint_url(messages_path: &str, id: &SessionId) -> String {
    format!("{messages_path}?{SESSION_ID_PARAM}={id}")
}

/// Build the SSE event for one outbound message.
///
/// `text` comes from [`tether_core::Message::event_text`]; line feeds split it into
/// `data:` lines that the client rejoins into the same bytes.
pub fn message_event(text: &str) -> Event {
    Event::default().event(MESSAGE_EVENT).data(text)
}

/// GET `<sse_path>`
pub async fn push_handler(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (session, channels) = state.registry.create().map_err(|err| {
        counter!(PUSH_REJECTED_TOTAL).increment(1);
        warn!(error = %err, "refusing push stream");
        if state.registry.is_shutting_down() {
            ApiError::shutting_down()
        } else {
            ApiError::max_sessions(err.to_string())
        }
    })?;
    let SessionChannels { shim, mut outbound } = channels;
    let id = session.id();
    let guard = SessionGuard::new(state.registry.clone(), id);
    let endpoint = endpoint_url(&state.messages_path, &id);
    info!(session_id = %id, "push stream opened");

    let stream = async_stream::stream! {
        let _guard = guard;
        if !session.activate() {
            return;
        }

        let handler = state.handler.clone();
        let registry = state.registry.clone();
        let task_session = session.clone();
        let _ = state.tracker.spawn(async move {
            handler.run(task_session, shim).await;
            let _ = registry.close(&id);
        });

        yield Ok(Event::default().event(ENDPOINT_EVENT).data(endpoint));

        while let Some(message) = outbound.next().await {
            match message.event_text() {
                Ok(text) => {
                    counter!(MESSAGES_OUTBOUND_TOTAL).increment(1);
                    yield Ok(message_event(text));
                }
                Err(err) => warn!(session_id = %id, error = %err, "dropping unframeable outbound message"),
            }
        }
        debug!(session_id = %id, "outbound queue drained");
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}
