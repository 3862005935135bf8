//! # tether-rpc
//!
//! JSON-RPC 2.0 layer that runs on a tether session.
//!
//! [`RpcService`] implements [`tether_core::SessionHandler`]: it reads each
//! inbound message from the session shim, dispatches requests through a
//! [`MethodRegistry`], and writes responses back onto the push stream.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod service;
pub mod types;

pub use context::RequestContext;
pub use errors::RpcError;
pub use handlers::{ServerInfo, register_builtin};
pub use registry::{MethodHandler, MethodRegistry};
pub use service::RpcService;
pub use types::{Incoming, RequestId, RpcErrorObject, RpcRequest, RpcResponse};
