//! Incremental Server-Sent Events parser.
//!
//! Buffers chunked bytes, splits on line ends (`\n`, `\r\n`), joins multi-line
//! `data:` fields, and dispatches an event on each blank line. Comment lines
//! (keep-alives) are dropped.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::errors::ClientError;

/// Event name used when a block carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched SSE event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, `message` when the block had none.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Line-oriented SSE state machine.
#[derive(Debug, Default)]
pub struct EventParser {
    buffer: BytesMut,
    event: Option<String>,
    data: Option<String>,
}

impl EventParser {
    /// Empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush at end of stream: a trailing unterminated block is dispatched.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_owned();
            let _ = self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                match &mut self.data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_owned()),
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = self.data.take()?;
        Some(SseEvent {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| DEFAULT_EVENT.to_owned()),
            data,
        })
    }
}

/// Turn a byte stream into a stream of SSE events.
pub fn event_stream<S>(bytes: S) -> impl Stream<Item = Result<SseEvent, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (bytes, EventParser::new(), VecDeque::new(), false),
        |(mut bytes, mut parser, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (bytes, parser, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.feed(&chunk)),
                    Some(Err(e)) => {
                        return Some((Err(ClientError::Http(e)), (bytes, parser, pending, true)));
                    }
                    None => {
                        pending.extend(parser.finish());
                        done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(event: &str, data: &str) -> SseEvent {
        SseEvent {
            event: event.into(),
            data: data.into(),
        }
    }

    #[test]
    fn parses_named_event() {
        let mut p = EventParser::new();
        let events = p.feed(b"event: endpoint\ndata: /messages/?session_id=ab\n\n");
        assert_eq!(events, vec![ev("endpoint", "/messages/?session_id=ab")]);
    }

    #[test]
    fn default_event_name_is_message() {
        let mut p = EventParser::new();
        assert_eq!(p.feed(b"data: {}\n\n"), vec![ev("message", "{}")]);
    }

    #[test]
    fn handles_split_chunks_and_crlf() {
        let mut p = EventParser::new();
        assert!(p.feed(b"event: mess").is_empty());
        assert!(p.feed(b"age\r\ndata: {\"a\"").is_empty());
        assert_eq!(p.feed(b":1}\r\n\r\n"), vec![ev("message", "{\"a\":1}")]);
    }

    #[test]
    fn joins_multiline_data() {
        let mut p = EventParser::new();
        let events = p.feed(b"event: message\ndata: {\ndata: \"a\": 1\ndata: }\n\n");
        assert_eq!(events, vec![ev("message", "{\n\"a\": 1\n}")]);
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let mut p = EventParser::new();
        let events = p.feed(b":\n\n: keep-alive\nid: 7\nretry: 10\ndata: x\n\n");
        assert_eq!(events, vec![ev("message", "x")]);
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut p = EventParser::new();
        assert!(p.feed(b"event: endpoint\n\n").is_empty());
        // the dangling event name does not leak into the next block
        assert_eq!(p.feed(b"data: y\n\n"), vec![ev("message", "y")]);
    }

    #[test]
    fn finish_flushes_trailing_block() {
        let mut p = EventParser::new();
        assert!(p.feed(b"event: message\ndata: tail").is_empty());
        assert_eq!(p.finish(), Some(ev("message", "tail")));
        assert_eq!(p.finish(), None);
    }

    #[tokio::test]
    async fn event_stream_yields_across_chunks() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"event: endpoint\ndata: /m?session_id=1\n\nevent: mes")),
            Ok(Bytes::from_static(b"sage\ndata: {}\n\n")),
        ];
        let events: Vec<_> = event_stream(futures::stream::iter(chunks)).collect().await;
        let events: Vec<SseEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events, vec![ev("endpoint", "/m?session_id=1"), ev("message", "{}")]);
    }
}
