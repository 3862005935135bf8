//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tether_core::TransportError;
use tether_core::errors::{BAD_REQUEST, CONNECTION_LOST, SESSION_NOT_FOUND, SESSION_OVERLOADED};

/// The session table is full; new push streams are refused.
pub const MAX_SESSIONS_REACHED: &str = "MAX_SESSIONS_REACHED";
/// The server is draining; new push streams are refused.
pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: &'static str,
    /// Human-readable detail.
    pub message: String,
}

/// An error rendered as `{ "code", "message" }` with a status.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Error with an explicit status and code.
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Intake without a `session_id` query parameter.
    pub fn missing_session_id() -> Self {
        Self::new(StatusCode::BAD_REQUEST, BAD_REQUEST, "session_id is required")
    }

    /// Push stream refused at the session limit.
    pub fn max_sessions(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, MAX_SESSIONS_REACHED, message)
    }

    /// Push stream refused because the server is shutting down.
    pub fn shutting_down() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN, "server is shutting down")
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SessionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, SESSION_NOT_FOUND, "Could not find session")
            }
            TransportError::BadRequest(message) => Self::new(StatusCode::BAD_REQUEST, BAD_REQUEST, message),
            TransportError::SessionOverloaded(message) => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, SESSION_OVERLOADED, message)
            }
            TransportError::ConnectionLost(id) => Self::new(
                StatusCode::GONE,
                CONNECTION_LOST,
                format!("connection lost for session {id}"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
