//! Per-request context handed to method handlers.

use tether_core::SessionId;

/// What a handler knows about the call it is serving.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Session the request arrived on.
    pub session_id: SessionId,
    /// Method being invoked.
    pub method: String,
}

impl RequestContext {
    /// Context for `method` on `session_id`.
    pub fn new(session_id: SessionId, method: impl Into<String>) -> Self {
        Self {
            session_id,
            method: method.into(),
        }
    }
}
