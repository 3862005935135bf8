//! JSON-RPC 2.0 wire-format types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RpcError;

/// Protocol version tag written on every outgoing message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: a JSON string or integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// Request or notification. A notification has no `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Optional on input; always `"2.0"` when built locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Method name.
    pub method: String,
    /// Positional or named parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request expecting a response.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Whether no response is expected.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Error member of a failed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric JSON-RPC error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Extra detail, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing response. Exactly one of `result` or `error` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// `null` when the request id could not be determined.
    pub id: Option<RequestId>,
    /// Set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Option<RequestId>, err: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(err.to_error_object()),
        }
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A decoded inbound message.
#[derive(Clone, Debug)]
pub enum Incoming {
    /// Call expecting a response.
    Request(RpcRequest),
    /// Fire-and-forget call.
    Notification(RpcRequest),
    /// A response sent by the peer; carries the raw object.
    Response(Value),
}

/// Why an inbound payload was rejected, with the id to answer on if known.
#[derive(Debug)]
pub struct DecodeFailure {
    /// Id recovered from the payload, if any.
    pub id: Option<RequestId>,
    /// What was wrong.
    pub error: RpcError,
}

impl DecodeFailure {
    fn invalid(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self {
            id,
            error: RpcError::InvalidRequest { message: message.into() },
        }
    }

    /// Error response to send back for this failure.
    pub fn to_response(&self) -> RpcResponse {
        RpcResponse::error(self.id.clone(), &self.error)
    }
}

impl Incoming {
    /// Classify a raw payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeFailure> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| DecodeFailure {
            id: None,
            error: RpcError::Parse { message: e.to_string() },
        })?;
        match value {
            Value::Object(obj) => Self::from_object(obj),
            Value::Array(_) => Err(DecodeFailure::invalid(None, "batch requests are not supported")),
            _ => Err(DecodeFailure::invalid(None, "expected a JSON object")),
        }
    }

    fn from_object(obj: Map<String, Value>) -> Result<Self, DecodeFailure> {
        let id = match obj.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => match RequestId::deserialize(raw) {
                Ok(id) => Some(id),
                Err(_) => return Err(DecodeFailure::invalid(None, "id must be a string or integer")),
            },
        };

        match obj.get("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(_) => return Err(DecodeFailure::invalid(id, "jsonrpc must be \"2.0\"")),
        }

        let method = match obj.get("method") {
            Some(Value::String(m)) => m.clone(),
            Some(_) => return Err(DecodeFailure::invalid(id, "method must be a string")),
            None if obj.contains_key("result") || obj.contains_key("error") => {
                return Ok(Self::Response(Value::Object(obj)));
            }
            None => return Err(DecodeFailure::invalid(id, "missing method")),
        };

        let params = match obj.get("params") {
            None | Some(Value::Null) => None,
            Some(p) => Some(p.clone()),
        };

        let request = RpcRequest {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            id,
            method,
            params,
        };
        Ok(if request.is_notification() {
            Self::Notification(request)
        } else {
            Self::Request(request)
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::errors::{INVALID_REQUEST, PARSE_ERROR};

    #[test]
    fn decode_request_with_numeric_id() {
        let incoming = Incoming::decode(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert_matches!(incoming, Incoming::Request(req) => {
            assert_eq!(req.id, Some(RequestId::Number(7)));
            assert_eq!(req.method, "ping");
            assert!(req.params.is_none());
        });
    }

    #[test]
    fn decode_without_jsonrpc_field() {
        let incoming = Incoming::decode(br#"{"id":"a","method":"ping","params":{}}"#).unwrap();
        assert_matches!(incoming, Incoming::Request(req) => {
            assert_eq!(req.id, Some(RequestId::String("a".into())));
            assert_eq!(req.params, Some(json!({})));
        });
    }

    #[test]
    fn decode_notification() {
        let incoming = Incoming::decode(br#"{"method":"notifications/initialized"}"#).unwrap();
        assert_matches!(incoming, Incoming::Notification(req) if req.method == "notifications/initialized");
    }

    #[test]
    fn decode_peer_response() {
        let incoming = Incoming::decode(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert_matches!(incoming, Incoming::Response(v) if v["id"] == 1);
    }

    #[test]
    fn decode_parse_error_has_null_id() {
        let failure = Incoming::decode(b"{oops").unwrap_err();
        assert!(failure.id.is_none());
        assert_eq!(failure.error.code(), PARSE_ERROR);
        let v = serde_json::to_value(failure.to_response()).unwrap();
        assert_eq!(v["id"], Value::Null);
        assert_eq!(v["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn decode_rejects_batches_and_scalars() {
        assert_eq!(Incoming::decode(b"[]").unwrap_err().error.code(), INVALID_REQUEST);
        assert_eq!(Incoming::decode(b"42").unwrap_err().error.code(), INVALID_REQUEST);
    }

    #[test]
    fn decode_invalid_request_keeps_id() {
        let failure = Incoming::decode(br#"{"id":3,"method":5}"#).unwrap_err();
        assert_eq!(failure.id, Some(RequestId::Number(3)));
        assert_eq!(failure.error.code(), INVALID_REQUEST);

        let failure = Incoming::decode(br#"{"jsonrpc":"1.0","id":4,"method":"ping"}"#).unwrap_err();
        assert_eq!(failure.id, Some(RequestId::Number(4)));
    }

    #[test]
    fn success_response_shape() {
        let v = serde_json::to_value(RpcResponse::success(RequestId::Number(1), json!("pong"))).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "id": 1, "result": "pong"}));
    }

    #[test]
    fn null_result_is_still_serialized() {
        let v = serde_json::to_value(RpcResponse::success("x".into(), Value::Null)).unwrap();
        assert!(v.as_object().unwrap().contains_key("result"));
        assert!(v.get("error").is_none());
    }

    #[test]
    fn built_request_serializes_version() {
        let v = serde_json::to_value(RpcRequest::new(2, "ping", None)).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}));
        let n = serde_json::to_value(RpcRequest::notification("bye", None)).unwrap();
        assert!(n.get("id").is_none());
    }
}
