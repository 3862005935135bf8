//! # tether-server
//!
//! HTTP surface for tether sessions, built on axum.
//!
//! - `GET /sse` opens a session and streams its outbound messages
//! - `POST /messages/?session_id=<id>` feeds its inbound queue
//! - `GET /health` and `GET /metrics` for operators

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod intake;
pub mod metrics;
pub mod push;
pub mod server;
pub mod shutdown;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use server::{AppState, TetherServer};
pub use shutdown::ShutdownCoordinator;
