//! Session loop that serves JSON-RPC over a tether shim.

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{Message, Session, SessionHandler, SessionShim, TransportError};
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::handlers::{ServerInfo, register_builtin};
use crate::registry::MethodRegistry;
use crate::types::{Incoming, RpcResponse};

/// Serves one session at a time per `run` call; requests within a session are
/// handled in arrival order.
#[derive(Clone)]
pub struct RpcService {
    registry: Arc<MethodRegistry>,
}

impl RpcService {
    /// Serve the methods in `registry`.
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Service answering only the built-in methods.
    pub fn with_builtins(info: ServerInfo) -> Self {
        let mut registry = MethodRegistry::new();
        register_builtin(&mut registry, info);
        Self::new(registry)
    }

    /// Methods this service dispatches to.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    async fn respond(shim: &SessionShim, response: &RpcResponse) -> Result<(), TransportError> {
        let message = Message::to_json(response)
            .map_err(|e| TransportError::BadRequest(format!("failed to encode response: {e}")))?;
        shim.write(message).await
    }
}

#[async_trait]
impl SessionHandler for RpcService {
    async fn run(&self, session: Arc<Session>, mut shim: SessionShim) {
        let session_id = session.id();
        debug!(%session_id, "rpc service started");

        while let Some(message) = shim.read().await {
            let response = match Incoming::decode(message.as_bytes()) {
                Ok(Incoming::Request(request) | Incoming::Notification(request)) => {
                    let ctx = RequestContext::new(session_id, request.method.clone());
                    self.registry.dispatch(request, &ctx).await
                }
                Ok(Incoming::Response(value)) => {
                    debug!(%session_id, id = %value["id"], "ignoring response from client");
                    None
                }
                Err(failure) => {
                    debug!(%session_id, error = %failure.error, "rejecting inbound message");
                    Some(failure.to_response())
                }
            };

            let Some(response) = response else { continue };
            match Self::respond(&shim, &response).await {
                Ok(()) => {}
                Err(TransportError::ConnectionLost(_)) => break,
                Err(e) => warn!(%session_id, error = %e, "failed to send response"),
            }
        }

        info!(%session_id, "rpc service finished");
    }
}
