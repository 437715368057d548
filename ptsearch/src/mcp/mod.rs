//! Tool protocol for ptsearch
//!
//! This module implements the transport-agnostic half of the protocol:
//! message envelopes, the per-session lifecycle, the tool descriptor and the
//! call handler. The transports in [`crate::transport`] only move bytes.
//!
//! ## Methods
//!
//! - `initialize` - handshake, moves the session to `Ready`
//! - `list_tools` (`tools/list`) - returns the single tool descriptor
//! - `call_tool` (`tools/call`) - runs a search
//! - `shutdown` - orderly end of session
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ptsearch::mcp::{McpServer, Session};
//! use std::sync::Mutex;
//!
//! let session = Mutex::new(Session::new());
//! let response = server.handle_message(&session, r#"{"id":1,"method":"initialize"}"#).await;
//! ```

mod handler;
mod protocol;
mod server;
mod session;
pub mod tools;

pub use handler::{CallHandler, CallResult, DEFAULT_EMBED_TIMEOUT, DEFAULT_STORE_TIMEOUT};
pub use protocol::{
    decode, CallRequest, ErrorKind, ErrorObject, Inbound, Method, ProtocolError, Response,
    PROTOCOL_VERSION,
};
pub use server::McpServer;
pub use session::{Session, SessionState};
pub use tools::{SearchArgs, ToolDescriptor};
