//! Connecting to a tether server and exchanging messages.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Value, json};
use tether_core::SessionId;
use tracing::{debug, info};
use url::Url;

use crate::errors::ClientError;
use crate::sse::{SseEvent, event_stream};

/// Default wait for the `endpoint` handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for a call's response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, ClientError>> + Send>>;

/// Connection settings for a tether server.
#[derive(Clone, Debug)]
pub struct TetherClient {
    http: reqwest::Client,
    base: Url,
    sse_path: String,
    handshake_timeout: Duration,
    call_timeout: Duration,
}

impl TetherClient {
    /// Client for the server rooted at `base`, e.g. `http://127.0.0.1:8080`.
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: Url::parse(base)?,
            sse_path: "/sse".into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Open a session against `base` with default settings.
    pub async fn connect(base: &str) -> Result<ClientSession, ClientError> {
        Self::new(base)?.open().await
    }

    /// Push stream path (default `/sse`).
    #[must_use]
    pub fn with_sse_path(mut self, path: impl Into<String>) -> Self {
        self.sse_path = path.into();
        self
    }

    /// How long `open` waits for the `endpoint` event.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// How long `call` waits for its response.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Open the push stream and wait for the `endpoint` event.
    pub async fn open(&self) -> Result<ClientSession, ClientError> {
        let sse_url = self.base.join(&self.sse_path)?;
        let response = self
            .http
            .get(sse_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut events: EventStream = Box::pin(event_stream(Box::pin(response.bytes_stream())));
        let path = tokio::time::timeout(self.handshake_timeout, wait_for_endpoint(&mut events))
            .await
            .map_err(|_| ClientError::HandshakeTimeout(self.handshake_timeout))??;
        let endpoint = sse_url.join(&path)?;
        let session_id = session_id_from(&endpoint)?;
        info!(%session_id, %endpoint, "tether session opened");

        Ok(ClientSession {
            http: self.http.clone(),
            endpoint,
            session_id,
            events,
            buffered: VecDeque::new(),
            next_id: 1,
            call_timeout: self.call_timeout,
        })
    }
}

async fn wait_for_endpoint(events: &mut EventStream) -> Result<String, ClientError> {
    while let Some(event) = events.next().await {
        let event = event?;
        if event.event == "endpoint" {
            return Ok(event.data);
        }
        debug!(event = %event.event, "skipping event before handshake");
    }
    Err(ClientError::Handshake("push stream ended before the endpoint event".into()))
}

/// Pull the `session_id` query parameter out of an intake URL.
pub fn session_id_from(endpoint: &Url) -> Result<SessionId, ClientError> {
    let raw = endpoint
        .query_pairs()
        .find_map(|(k, v)| (k == "session_id").then(|| v.into_owned()))
        .ok_or_else(|| ClientError::Handshake(format!("no session_id in {endpoint}")))?;
    raw.parse()
        .map_err(|_| ClientError::Handshake(format!("malformed session_id `{raw}`")))
}

/// One open session. Dropping it closes the push stream, which ends the
/// session on the server.
pub struct ClientSession {
    http: reqwest::Client,
    endpoint: Url,
    session_id: SessionId,
    events: EventStream,
    buffered: VecDeque<Value>,
    next_id: i64,
    call_timeout: Duration,
}

impl ClientSession {
    /// Id parsed from the handshake endpoint.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Intake URL announced by the server.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST one message. Anything but 202 is a [`ClientError::Rejected`].
    pub async fn send(&self, message: &Value) -> Result<(), ClientError> {
        self.send_raw(serde_json::to_vec(message)?).await
    }

    /// POST a raw body as-is.
    pub async fn send_raw(&self, body: impl Into<reqwest::Body>) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// Next pushed message, or `None` once the stream ends.
    pub async fn next_message(&mut self) -> Result<Option<Value>, ClientError> {
        if let Some(message) = self.buffered.pop_front() {
            return Ok(Some(message));
        }
        self.read_pushed().await
    }

    async fn read_pushed(&mut self) -> Result<Option<Value>, ClientError> {
        while let Some(event) = self.events.next().await {
            let event = event?;
            if event.event == "message" {
                return Ok(Some(serde_json::from_str(&event.data)?));
            }
            debug!(event = %event.event, "ignoring event");
        }
        Ok(None)
    }

    /// Send a notification (no id, no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        let mut message = json!({ "jsonrpc": "2.0", "method": method });
        if let Some(params) = params {
            message["params"] = params;
        }
        self.send(&message).await
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// Unrelated pushed messages that arrive meanwhile are kept for
    /// [`ClientSession::next_message`].
    pub async fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let mut request = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if let Some(params) = params {
            request["params"] = params;
        }
        self.send(&request).await?;

        let timeout = self.call_timeout;
        let response = tokio::time::timeout(timeout, self.wait_for_response(id))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;

        if let Some(error) = response.get("error") {
            return Err(ClientError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_response(&mut self, id: i64) -> Result<Value, ClientError> {
        loop {
            let Some(message) = self.read_pushed().await? else {
                return Err(ClientError::StreamEnded);
            };
            let is_response = message.get("method").is_none()
                && message.get("id").and_then(Value::as_i64) == Some(id);
            if is_response {
                return Ok(message);
            }
            self.buffered.push_back(message);
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("session_id", &self.session_id)
            .field("endpoint", &self.endpoint.as_str())
            .field("buffered", &self.buffered.len())
            .finish_non_exhaustive()
    }
}
