//! Opaque message payloads.

use std::borrow::Cow;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::TransportError;

/// One serialized RPC payload.
///
/// The transport never splits, merges, or reorders messages; the bytes are
/// only interpreted by the layer above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    /// Wrap raw bytes without validation.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Validate an intake body: it must be a non-empty JSON document.
    pub fn parse(body: Bytes) -> Result<Self, TransportError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(TransportError::BadRequest("Could not parse message: empty body".into()));
        }
        // IgnoredAny checks well-formedness without building a tree
        if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&body) {
            return Err(TransportError::BadRequest(format!("Could not parse message: {e}")));
        }
        Ok(Self(body))
    }

    /// Serialize a value into a message.
    pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(|v| Self(Bytes::from(v)))
    }

    /// Deserialize the payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload as event-stream text, byte for byte.
    ///
    /// Fails with `BadRequest` for invalid UTF-8 or a carriage return, neither
    /// of which survives SSE framing unchanged.
    pub fn event_text(&self) -> Result<&str, TransportError> {
        let text = std::str::from_utf8(&self.0)
            .map_err(|e| TransportError::BadRequest(format!("message is not valid UTF-8: {e}")))?;
        if text.contains('\r') {
            return Err(TransportError::BadRequest("message contains a carriage return".into()));
        }
        Ok(text)
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwrap into the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn parse_accepts_json_object() {
        let msg = Message::parse(Bytes::from_static(br#"{"id":1,"method":"ping"}"#)).unwrap();
        assert_eq!(msg.as_bytes(), br#"{"id":1,"method":"ping"}"#);
    }

    #[test]
    fn parse_keeps_bytes_verbatim() {
        let body = Bytes::from_static(b"{ \"a\" :\n 1 }");
        let msg = Message::parse(body.clone()).unwrap();
        assert_eq!(msg.into_bytes(), body);
    }

    #[test]
    fn parse_rejects_empty_and_blank() {
        assert_matches!(Message::parse(Bytes::new()), Err(TransportError::BadRequest(_)));
        assert_matches!(
            Message::parse(Bytes::from_static(b"  \n")),
            Err(TransportError::BadRequest(_))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = Message::parse(Bytes::from_static(b"{not json")).unwrap_err();
        assert_matches!(err, TransportError::BadRequest(m) if m.starts_with("Could not parse message"));
    }

    #[test]
    fn to_json_then_read_back() {
        let msg = Message::to_json(&json!({"id": 1, "result": "pong"})).unwrap();
        let v: Value = msg.json().unwrap();
        assert_eq!(v["result"], "pong");
        assert_eq!(msg.text(), r#"{"id":1,"result":"pong"}"#);
    }

    #[test]
    fn event_text_is_verbatim() {
        let msg = Message::from("{\"a\":1,\n\"b\":\"caf\u{e9}\"}");
        assert_eq!(msg.event_text().unwrap(), "{\"a\":1,\n\"b\":\"caf\u{e9}\"}");
    }

    #[test]
    fn event_text_rejects_what_framing_would_rewrite() {
        assert_matches!(
            Message::from_bytes(vec![b'"', 0xff, b'"']).event_text(),
            Err(TransportError::BadRequest(_))
        );
        assert_matches!(
            Message::from("{\"a\":1,\r\n\"b\":2}").event_text(),
            Err(TransportError::BadRequest(_))
        );
    }

    #[test]
    fn text_is_lossy_for_invalid_utf8() {
        let msg = Message::from_bytes(vec![0x66, 0xff, 0x6f]);
        assert_eq!(msg.text(), "f\u{fffd}o");
        assert_eq!(msg.len(), 3);
        assert!(!msg.is_empty());
    }
}
