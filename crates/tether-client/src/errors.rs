//! Client error type.

use std::time::Duration;

/// Errors surfaced by [`crate::TetherClient`] and [`crate::ClientSession`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A pushed message or response was not valid JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Base URL or advertised endpoint could not be parsed.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The server did not send the `endpoint` event in time.
    #[error("no endpoint event within {0:?}")]
    HandshakeTimeout(Duration),

    /// The handshake arrived but could not be used.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server answered with an unexpected status.
    #[error("request rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, usually `{ "code", "message" }`.
        body: String,
    },

    /// A call returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// A call got no response in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The push stream ended.
    #[error("push stream ended")]
    StreamEnded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_includes_status_and_body() {
        let err = ClientError::Rejected {
            status: 404,
            body: "Could not find session".into(),
        };
        assert_eq!(
            err.to_string(),
            "request rejected with status 404: Could not find session"
        );
    }

    #[test]
    fn url_errors_convert() {
        let err: ClientError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ClientError::Url(_)));
    }
}
