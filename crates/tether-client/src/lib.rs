//! # tether-client
//!
//! Opens a tether push stream, waits for the `endpoint` handshake, and then
//! exchanges JSON messages: POSTs go out through [`ClientSession::send`],
//! pushed messages come back through [`ClientSession::next_message`].

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod sse;

pub use client::{ClientSession, TetherClient};
pub use errors::ClientError;
pub use sse::{EventParser, SseEvent};
