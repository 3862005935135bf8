//! # tether-core
//!
//! Transport floor for a duplex channel spliced from a server-push stream
//! (server → client) and discrete POST requests (client → server).
//!
//! - [`SessionRegistry`]: lifecycle-scoped table of live sessions
//! - [`Session`]: identity, status, and the inbound queue producer
//! - [`SessionShim`]: the readable/writable pair handed to the RPC layer
//! - [`OutboundQueue`]: the consumer side drained by the push stream
//! - [`SessionHandler`]: seam for whatever runs on top of a session

#![deny(unsafe_code)]

pub mod errors;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod message;
pub mod metric_names;
pub mod registry;
pub mod session;
pub mod shim;

pub use errors::{Result, TransportError};
pub use handler::{EchoHandler, SessionHandler};
pub use ids::{InvalidSessionId, SessionId};
pub use logging::{LogFormat, init_subscriber};
pub use message::Message;
pub use registry::{RegistryConfig, SessionChannels, SessionRegistry};
pub use session::{Session, SessionStatus};
pub use shim::{OutboundQueue, SessionShim, ShimReader, ShimWriter};
