//! Built-in methods every session answers.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::RequestContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};

/// Protocol revisions `initialize` will echo back; the first is preferred.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26"];

/// Identity reported by `initialize`.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    /// Reported as `serverInfo.name`.
    pub name: String,
    /// Reported as `serverInfo.version`.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "tether".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// `ping` → `"pong"`.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RequestContext) -> Result<Value, RpcError> {
        Ok(json!("pong"))
    }
}

/// Handshake: echoes a supported client protocol version, otherwise offers
/// the preferred one.
pub struct InitializeHandler {
    info: ServerInfo,
}

impl InitializeHandler {
    /// Answer with `info` as `serverInfo`.
    pub fn new(info: ServerInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl MethodHandler for InitializeHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RequestContext) -> Result<Value, RpcError> {
        let requested = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
        debug!(session_id = %ctx.session_id, ?requested, version, "initialize");

        Ok(json!({
            "protocolVersion": version,
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version,
            },
            "capabilities": {},
        }))
    }
}

/// `notifications/initialized`: accepted, nothing to do.
pub struct InitializedHandler;

#[async_trait]
impl MethodHandler for InitializedHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RequestContext) -> Result<Value, RpcError> {
        debug!(session_id = %ctx.session_id, "client initialized");
        Ok(Value::Null)
    }
}

/// Register `ping`, `initialize`, and `notifications/initialized`.
pub fn register_builtin(registry: &mut MethodRegistry, info: ServerInfo) {
    registry.register("ping", PingHandler);
    registry.register("initialize", InitializeHandler::new(info));
    registry.register("notifications/initialized", InitializedHandler);
}

#[cfg(test)]
mod tests {
    use tether_core::SessionId;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new(SessionId::generate(), "test")
    }

    #[tokio::test]
    async fn ping_pongs() {
        assert_eq!(PingHandler.handle(None, &ctx()).await.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let handler = InitializeHandler::new(ServerInfo {
            name: "unit".into(),
            version: "9.9.9".into(),
        });
        let result = handler.handle(None, &ctx()).await.unwrap();
        assert_eq!(result["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
        assert_eq!(result["serverInfo"]["name"], "unit");
        assert_eq!(result["serverInfo"]["version"], "9.9.9");
        assert_eq!(result["capabilities"], json!({}));
    }

    #[tokio::test]
    async fn initialize_echoes_supported_version() {
        let handler = InitializeHandler::new(ServerInfo::default());
        let result = handler
            .handle(Some(json!({"protocolVersion": "2025-03-26"})), &ctx())
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");

        let result = handler
            .handle(Some(json!({"protocolVersion": "1999-01-01"})), &ctx())
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[test]
    fn builtins_registered() {
        let mut reg = MethodRegistry::new();
        register_builtin(&mut reg, ServerInfo::default());
        assert_eq!(reg.methods(), vec!["initialize", "notifications/initialized", "ping"]);
    }
}
