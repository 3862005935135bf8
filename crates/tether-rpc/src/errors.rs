//! JSON-RPC error codes and error type.

use serde_json::Value;

use crate::types::RpcErrorObject;

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error, including handler timeouts.
pub const INTERNAL_ERROR: i64 = -32603;

/// Error returned by method handlers and by request decoding.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Payload was not valid JSON.
    #[error("Parse error: {message}")]
    Parse {
        /// Decoder message.
        message: String,
    },

    /// Payload was JSON but not a request object.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with it.
        message: String,
    },

    /// No handler is registered for the method.
    #[error("Method '{method}' not found")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },

    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Application-defined error with an arbitrary code.
    #[error("{message}")]
    Custom {
        /// Numeric code outside the reserved range.
        code: i64,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },
}

impl RpcError {
    /// Numeric JSON-RPC code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Custom { code, .. } => *code,
        }
    }

    /// Convert to the wire-format error object.
    pub fn to_error_object(&self) -> RpcErrorObject {
        RpcErrorObject {
            code: self.code(),
            message: self.to_string(),
            data: match self {
                Self::Custom { data, .. } => data.clone(),
                _ => None,
            },
        }
    }
}
