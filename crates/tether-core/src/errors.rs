//! Transport error taxonomy.

use crate::ids::{InvalidSessionId, SessionId};

/// Intake referenced an unknown, closed, or expired session.
pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
/// Malformed session id or unparseable body.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// A queue (or the session table) is at capacity.
pub const SESSION_OVERLOADED: &str = "SESSION_OVERLOADED";
/// The push connection went away.
pub const CONNECTION_LOST: &str = "CONNECTION_LOST";

/// Errors surfaced by the session layer.
///
/// None of these are fatal to the process; each is scoped to one session or
/// one intake request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No active session matches the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The request could not be understood.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A bounded queue is full; the caller should back off.
    #[error("session overloaded: {0}")]
    SessionOverloaded(String),

    /// The session was torn down while the operation was in flight.
    #[error("connection lost for session {0}")]
    ConnectionLost(SessionId),
}

impl TransportError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => SESSION_NOT_FOUND,
            Self::BadRequest(_) => BAD_REQUEST,
            Self::SessionOverloaded(_) => SESSION_OVERLOADED,
            Self::ConnectionLost(_) => CONNECTION_LOST,
        }
    }

    /// Shorthand for [`TransportError::SessionNotFound`] keyed by an id.
    pub fn not_found(id: &SessionId) -> Self {
        Self::SessionNotFound(id.to_string())
    }
}

impl From<InvalidSessionId> for TransportError {
    fn from(_: InvalidSessionId) -> Self {
        Self::BadRequest("Invalid session ID".into())
    }
}

/// Result alias for session-layer operations.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_per_variant() {
        let id = SessionId::generate();
        assert_eq!(TransportError::not_found(&id).code(), SESSION_NOT_FOUND);
        assert_eq!(TransportError::BadRequest("x".into()).code(), BAD_REQUEST);
        assert_eq!(TransportError::SessionOverloaded("x".into()).code(), SESSION_OVERLOADED);
        assert_eq!(TransportError::ConnectionLost(id).code(), CONNECTION_LOST);
    }

    #[test]
    fn not_found_display_includes_id() {
        let id = SessionId::generate();
        let err = TransportError::not_found(&id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn invalid_id_becomes_bad_request() {
        let err: TransportError = "nope".parse::<SessionId>().unwrap_err().into();
        assert_eq!(err, TransportError::BadRequest("Invalid session ID".into()));
    }
}
