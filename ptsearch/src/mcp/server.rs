//! Session-aware dispatcher shared by every transport
//!
//! A transport owns one `Mutex<Session>` per client and hands each raw
//! message to [`McpServer::handle_message`]. The lock is only held for state
//! checks, never across an upstream await, so concurrent exchanges on the
//! same session do not serialize behind a slow call.

use super::handler::CallHandler;
use super::protocol::{decode, Inbound, Method, Response};
use super::session::{Session, SessionState};
use super::tools::ToolDescriptor;
use crate::config::Config;
use crate::upstream::{EmbeddingProvider, VectorStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Protocol server: lifecycle enforcement in front of a [`CallHandler`]
pub struct McpServer {
    handler: CallHandler,
}

impl McpServer {
    /// Wrap an existing handler
    pub fn new(handler: CallHandler) -> Self {
        Self { handler }
    }

    /// Build a server from configuration and collaborators
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(CallHandler::from_config(config, embedder, store))
    }

    /// The exposed tool
    pub fn describe(&self) -> &ToolDescriptor {
        self.handler.descriptor()
    }

    /// `{"tools": [descriptor]}`, identical to the `list_tools` result
    pub fn discovery_payload(&self) -> Value {
        self.handler.list_tools()
    }

    /// Decode and dispatch one raw message.
    ///
    /// Returns the response to emit, or `None` when nothing may be sent
    /// (notifications, or a request abandoned by session termination).
    pub async fn handle_message(&self, session: &Mutex<Session>, raw: &str) -> Option<Response> {
        match decode(raw) {
            Ok(inbound) => self.dispatch(session, inbound).await,
            Err(err) => {
                tracing::warn!("Malformed message: {}", err.message);
                Some(Response::failure(err))
            }
        }
    }

    /// Dispatch one decoded message against a session
    pub async fn dispatch(&self, session: &Mutex<Session>, inbound: Inbound) -> Option<Response> {
        let request = match inbound {
            Inbound::Notification { method } => {
                tracing::debug!("Notification received: {}", method);
                return None;
            }
            Inbound::Request(request) => request,
        };

        let admitted = lock(session).admit(&request);
        if let Err(err) = admitted {
            tracing::warn!(
                method = request.method.as_str(),
                id = %request.id,
                "Rejected request: {}",
                err.message
            );
            return Some(Response::failure(err));
        }

        let outcome = self.handler.handle(request.method, &request.params).await;

        let emit = {
            let mut session = lock(session);
            let emit = session.settle(&request.id);
            if request.method == Method::Shutdown {
                session.complete_shutdown();
            }
            emit
        };

        if !emit {
            tracing::debug!(id = %request.id, "Discarding response for abandoned request");
            return None;
        }

        Some(match outcome {
            Ok(result) => Response::success(request.id, result),
            Err(err) => {
                tracing::warn!(
                    method = request.method.as_str(),
                    id = %request.id,
                    kind = ?err.kind,
                    "Request failed: {}",
                    err.message
                );
                Response::failure(err.with_request_id(request.id))
            }
        })
    }

    /// Terminate a session whose channel closed, releasing handler resources
    /// if it never shut down cleanly
    pub async fn close_session(&self, session: &Mutex<Session>) {
        let was_terminated = {
            let mut session = lock(session);
            let was = session.state() == SessionState::Terminated;
            session.terminate();
            was
        };
        if !was_terminated {
            self.handler.shutdown().await;
        }
    }

    /// Health summary for a transport with `sessions` open sessions
    pub fn health(&self, sessions: usize) -> Value {
        json!({ "status": "ok", "sessions": sessions })
    }
}

/// Session locks are held only for non-panicking bookkeeping, so a poisoned
/// lock still guards consistent state
pub(crate) fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
