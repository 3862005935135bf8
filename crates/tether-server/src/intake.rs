//! Intake endpoint: routes one POSTed message into its session.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use bytes::Bytes;
use metrics::counter;
use tether_core::metric_names::{INTAKE_REJECTED_TOTAL, MESSAGES_INBOUND_TOTAL};
use tether_core::{Message, SessionId, TransportError};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::push::SESSION_ID_PARAM;
use crate::server::AppState;

/// POST `<messages_path>?session_id=<id>`
///
/// Answers 202 once the message is queued; processing happens later and
/// its outcome arrives on the push stream.
pub async fn intake_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    match accept(&state, &params, body) {
        Ok(id) => {
            counter!(MESSAGES_INBOUND_TOTAL).increment(1);
            debug!(session_id = %id, "message accepted");
            Ok(StatusCode::ACCEPTED)
        }
        Err(err) => {
            counter!(INTAKE_REJECTED_TOTAL, "reason" => err.code()).increment(1);
            if err.status() == StatusCode::TOO_MANY_REQUESTS {
                warn!(detail = err.message(), "intake rejected, queue full");
            } else {
                debug!(code = err.code(), detail = err.message(), "intake rejected");
            }
            Err(err)
        }
    }
}

fn accept(state: &AppState, params: &HashMap<String, String>, body: Bytes) -> Result<SessionId, ApiError> {
    let raw = params.get(SESSION_ID_PARAM).ok_or_else(ApiError::missing_session_id)?;
    let id: SessionId = raw.parse().map_err(TransportError::from)?;
    let session = state.registry.lookup(&id)?;
    let message = Message::parse(body)?;
    session.deliver(message)?;
    Ok(id)
}
