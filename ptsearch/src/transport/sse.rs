//! Event-stream transport
//!
//! # Endpoints
//!
//! - `GET /sse` - opens a session. The first event (`tools`) carries the
//!   discovery payload, the second (`endpoint`) the URL to post calls to.
//!   Dropping the connection terminates the session. The feed ends after
//!   a completed `shutdown`; later posts still receive `SequenceError`
//!   until the session is released.
//! - `POST /messages?session_id=<uuid>` - one request envelope in, one
//!   response envelope out
//! - `GET /health` - liveness and open session count
//!
//! Sessions are independent: each owns its own [`Session`], and the only
//! shared state is the read-only [`McpServer`].

use crate::config::ServerConfig;
use crate::error::Result;
use crate::mcp::{decode, Inbound, McpServer, ProtocolError, Response, Session, SessionState};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Event feed path
pub const SSE_PATH: &str = "/sse";
/// Call exchange path
pub const MESSAGES_PATH: &str = "/messages";
/// Health path
pub const HEALTH_PATH: &str = "/health";

/// Name of the discovery event
pub const EVENT_TOOLS: &str = "tools";
/// Name of the event announcing the call endpoint
pub const EVENT_ENDPOINT: &str = "endpoint";

/// One connected client
struct SessionHandle {
    session: Mutex<Session>,
    closed: watch::Sender<bool>,
    /// Set once the session reaches `Terminated` through `shutdown`; ends the feed
    finished: watch::Sender<bool>,
}

impl SessionHandle {
    fn new() -> Self {
        let (closed, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        Self {
            session: Mutex::new(Session::new()),
            closed,
            finished,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Terminate the session and wake every in-flight exchange
    fn close(&self) {
        self.lock().terminate();
        self.closed.send_replace(true);
    }

    /// Release the event feed if the session has terminated
    fn finish_if_terminated(&self) {
        if self.lock().state() == SessionState::Terminated {
            self.finished.send_replace(true);
        }
    }
}

#[derive(Clone, Default)]
struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionHandle>>>>,
}

impl SessionRegistry {
    fn insert(&self, id: Uuid, handle: Arc<SessionHandle>) {
        self.write().insert(id, handle);
    }

    fn get(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.read().get(id).cloned()
    }

    fn remove(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.write().remove(id)
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Arc<SessionHandle>>> {
        self.sessions.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Arc<SessionHandle>>> {
        self.sessions.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Removes and terminates its session when the event stream is dropped
struct SessionGuard {
    id: Uuid,
    handle: Arc<SessionHandle>,
    sessions: SessionRegistry,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        self.handle.close();
        tracing::info!(session = %self.id, "event-stream session closed");
    }
}

#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    sessions: SessionRegistry,
    keep_alive: Duration,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: String,
}

/// Build the event-stream router
pub fn router(server: Arc<McpServer>, keep_alive: Duration) -> Router {
    let state = AppState {
        server,
        sessions: SessionRegistry::default(),
        keep_alive,
    };

    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
        .route(HEALTH_PATH, get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(server: Arc<McpServer>, config: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        keep_alive_secs = config.keep_alive_secs,
        "event-stream transport listening on http://{}{}",
        addr,
        SSE_PATH
    );

    let app = router(server, Duration::from_secs(config.keep_alive_secs));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("event-stream transport stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received, shutting down");
}

async fn open_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let id = Uuid::new_v4();
    let handle = Arc::new(SessionHandle::new());
    state.sessions.insert(id, Arc::clone(&handle));

    tracing::info!(
        session = %id,
        open_sessions = state.sessions.len(),
        "event-stream session opened"
    );

    let tools = Event::default()
        .event(EVENT_TOOLS)
        .data(state.server.discovery_payload().to_string());
    let endpoint = Event::default()
        .event(EVENT_ENDPOINT)
        .data(format!("{}?session_id={}", MESSAGES_PATH, id));

    let guard = SessionGuard {
        id,
        handle: Arc::clone(&handle),
        sessions: state.sessions.clone(),
    };

    // the feed closes once the session has shut down
    let mut finished = handle.finished.subscribe();
    let until_finished = stream::once(async move {
        let _ = finished.wait_for(|finished| *finished).await;
    })
    .filter_map(|()| async { None::<Event> });

    // discovery performs the initialize transition as it is delivered
    let discovery = stream::once(async move {
        handle.lock().initialize_implicitly();
        tools
    });

    let events = discovery
        .chain(stream::iter([endpoint]))
        .chain(until_finished)
        .map(move |event| {
            let _open = &guard;
            Ok(event)
        });

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive))
}

async fn post_message(
    State(state): State<AppState>,
    query: std::result::Result<Query<MessageQuery>, QueryRejection>,
    body: Bytes,
) -> axum::response::Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::warn!("Message without a usable session id: {}", rejection);
            return envelope(
                StatusCode::BAD_REQUEST,
                ProtocolError::malformed(format!("Missing or invalid session_id: {}", rejection)),
            );
        }
    };

    let handle = Uuid::parse_str(&query.session_id)
        .ok()
        .and_then(|id| state.sessions.get(&id));
    let Some(handle) = handle else {
        tracing::warn!(session = %query.session_id, "message for unknown session");
        return envelope(
            StatusCode::NOT_FOUND,
            ProtocolError::sequence(format!("Unknown session: {}", query.session_id)),
        );
    };

    let body = match std::str::from_utf8(&body) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(session = %query.session_id, "Malformed message: {}", e);
            return envelope(
                StatusCode::BAD_REQUEST,
                ProtocolError::malformed(format!("Message is not valid UTF-8: {}", e)),
            );
        }
    };

    tracing::debug!(session = %query.session_id, "Received: {}", body);

    let inbound = match decode(body) {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!(session = %query.session_id, "Malformed message: {}", err.message);
            return envelope(StatusCode::BAD_REQUEST, err);
        }
    };
    let notification = matches!(inbound, Inbound::Notification { .. });

    let mut closed = handle.closed.subscribe();
    let reply = tokio::select! {
        response = state.server.dispatch(&handle.session, inbound) => match response {
            Some(response) => (StatusCode::OK, Json(response)).into_response(),
            None if notification => StatusCode::NO_CONTENT.into_response(),
            None => StatusCode::GONE.into_response(),
        },
        _ = closed.wait_for(|closed| *closed) => {
            tracing::debug!(session = %query.session_id, "session closed while call in flight");
            StatusCode::GONE.into_response()
        }
    };

    handle.finish_if_terminated();
    reply
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(state.server.health(state.sessions.len()))
}

fn envelope(status: StatusCode, error: ProtocolError) -> axum::response::Response {
    (status, Json(Response::failure(error))).into_response()
}
