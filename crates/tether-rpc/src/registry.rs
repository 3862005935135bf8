//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tether_core::metric_names::{RPC_ERRORS_TOTAL, RPC_REQUESTS_TOTAL, RPC_REQUEST_DURATION_SECONDS};
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::errors::RpcError;
use crate::types::{RpcRequest, RpcResponse};

/// Default ceiling on a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RequestContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    timeout: Duration,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Override the per-call handler timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a handler for a method name, replacing any previous one.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a request or notification.
    ///
    /// Returns `None` for notifications: their outcome is logged, never sent.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RequestContext) -> Option<RpcResponse> {
        let method = request.method.clone();
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(&method) else {
            counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => "method_not_found")
                .increment(1);
            let err = RpcError::MethodNotFound { method };
            return match request.id {
                Some(id) => Some(RpcResponse::error(Some(id), &err)),
                None => {
                    debug!(session_id = %ctx.session_id, %err, "ignoring notification");
                    None
                }
            };
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, handler.handle(request.params, ctx)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => "timeout")
                    .increment(1);
                error!(method, session_id = %ctx.session_id, "RPC handler timed out after {:?}", self.timeout);
                Err(RpcError::Internal {
                    message: format!("Handler for '{method}' timed out"),
                })
            }
        };

        let duration = start.elapsed();
        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.clone())
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(method, duration_secs = duration.as_secs_f64(), "slow RPC request");
        }

        let Some(id) = request.id else {
            if let Err(err) = outcome {
                debug!(method, session_id = %ctx.session_id, %err, "notification handler failed");
            }
            return None;
        };

        Some(match outcome {
            Ok(value) => RpcResponse::success(id, value),
            Err(err) => {
                counter!(RPC_ERRORS_TOTAL, "method" => method, "error_type" => err.code().to_string())
                    .increment(1);
                RpcResponse::error(Some(id), &err)
            }
        })
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
