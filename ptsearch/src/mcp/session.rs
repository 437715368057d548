//! Per-client session lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Ready --shutdown--> ShuttingDown --cleanup--> Terminated
//! ```
//!
//! `Ready` accepts `initialize`, `list_tools` and `call_tool` without changing
//! state. Every admitted request id is tracked until its response is settled,
//! so a response is emitted at most once per id and never for an id that was
//! abandoned.

use super::protocol::{CallRequest, Method, ProtocolError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Waiting for `initialize`
    Uninitialized,
    /// Serving discovery and calls
    Ready,
    /// `shutdown` received, cleanup in progress
    ShuttingDown,
    /// No further messages are accepted
    Terminated,
}

/// Mutable state for one client session
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    pending: HashSet<String>,
    started_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh, uninitialized session
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            pending: HashSet::new(),
            started_at: Utc::now(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// When the session was established
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of admitted requests still awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a response for `id` may still be emitted
    pub fn is_pending(&self, id: &Value) -> bool {
        self.pending.contains(&pending_key(id))
    }

    /// Perform the `initialize` transition without a request.
    ///
    /// Used by transports whose discovery step implies the handshake.
    pub fn initialize_implicitly(&mut self) {
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Ready;
        }
    }

    /// Check that `request` is legal now, apply its transition and mark its
    /// id as pending.
    ///
    /// A rejected request leaves the session unchanged. A duplicate of an
    /// in-flight id is rejected without echoing the id, so the original
    /// request keeps the only response for it.
    pub fn admit(&mut self, request: &CallRequest) -> Result<(), ProtocolError> {
        let key = pending_key(&request.id);
        if self.pending.contains(&key) {
            return Err(ProtocolError::sequence(format!(
                "Request id {} is already in flight",
                request.id
            )));
        }

        let next = match (self.state, request.method) {
            (SessionState::Uninitialized, Method::Initialize) => SessionState::Ready,
            (SessionState::Uninitialized, method) => {
                return Err(self.reject(request, format!(
                    "{} received before initialize",
                    method
                )));
            }
            (SessionState::Ready, Method::Shutdown) => SessionState::ShuttingDown,
            (SessionState::Ready, _) => SessionState::Ready,
            (SessionState::ShuttingDown, method) => {
                return Err(self.reject(request, format!("{} received during shutdown", method)));
            }
            (SessionState::Terminated, method) => {
                return Err(self.reject(request, format!(
                    "{} received after session terminated",
                    method
                )));
            }
        };

        self.state = next;
        self.pending.insert(key);
        Ok(())
    }

    /// Release the pending id for a finished request.
    ///
    /// Returns `false` when the id is no longer pending (the session was
    /// terminated while the request ran); the caller must then discard the
    /// response.
    pub fn settle(&mut self, id: &Value) -> bool {
        self.pending.remove(&pending_key(id))
    }

    /// Finish an orderly shutdown
    pub fn complete_shutdown(&mut self) {
        if self.state == SessionState::ShuttingDown {
            self.state = SessionState::Terminated;
        }
    }

    /// Terminate immediately, abandoning every in-flight request
    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
        self.pending.clear();
    }

    fn reject(&self, request: &CallRequest, message: String) -> ProtocolError {
        ProtocolError::sequence(message).with_request_id(request.id.clone())
    }
}

/// `1` and `"1"` are distinct ids
fn pending_key(id: &Value) -> String {
    id.to_string()
}
