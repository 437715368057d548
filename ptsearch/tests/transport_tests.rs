//! Integration tests for the STDIO and event-stream transports

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use http_body_util::BodyExt;
use ptsearch::mcp::{ErrorKind, Response, ToolDescriptor};
use ptsearch::search::ContentKind;
use ptsearch::transport::{sse, stdio};
use ptsearch::Config;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn quick_server() -> std::sync::Arc<ptsearch::McpServer> {
    server(
        &Config::default(),
        LengthEmbedder {
            delay: Duration::ZERO,
        },
        ScriptedStore {
            candidates: vec![
                candidate("guide", ContentKind::Text, 0.7),
                candidate("sample", ContentKind::Code, 0.6),
            ],
        },
    )
}

async fn run_stdio(server: std::sync::Arc<ptsearch::McpServer>, input: &str) -> Vec<Response> {
    run_stdio_bytes(server, input.as_bytes()).await
}

async fn run_stdio_bytes(
    server: std::sync::Arc<ptsearch::McpServer>,
    input: &[u8],
) -> Vec<Response> {
    let mut output = Vec::new();
    stdio::serve(server, input, &mut output)
        .await
        .unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// -----------------------------------------------------------------------------
// STDIO
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_stdio_survives_malformed_line() {
    let input = [
        request(json!(1), "initialize", Value::Null),
        "this is not json".to_string(),
        request(json!(2), "list_tools", Value::Null),
        String::new(),
        search_call(json!(3), "how do I use a DataLoader?"),
    ]
    .join("\n");

    let responses = run_stdio(quick_server(), &input).await;
    assert_eq!(responses.len(), 4);

    assert!(responses[0].result.is_some());
    assert_eq!(responses[1].error_kind(), Some(ErrorKind::MalformedMessage));
    assert_eq!(responses[1].id, Value::Null);
    assert_eq!(responses[2].id, json!(2));
    assert!(responses[2].result.is_some());
    assert_eq!(responses[3].id, json!(3));
    assert_eq!(responses[3].result.as_ref().unwrap()["count"], 2);
}

#[tokio::test]
async fn test_stdio_survives_invalid_utf8_line() {
    let mut input = request(json!(1), "initialize", Value::Null).into_bytes();
    input.extend_from_slice(b"\n\xff\xfe{\n");
    input.extend_from_slice(request(json!(2), "list_tools", Value::Null).as_bytes());
    input.push(b'\n');

    let responses = run_stdio_bytes(quick_server(), &input).await;
    assert_eq!(responses.len(), 3);

    assert!(responses[0].result.is_some());
    assert_eq!(responses[1].error_kind(), Some(ErrorKind::MalformedMessage));
    assert_eq!(responses[1].id, Value::Null);
    assert_eq!(responses[2].id, json!(2));
    assert_eq!(
        responses[2].result.as_ref().unwrap()["tools"][0]["name"],
        "search_pytorch_docs"
    );
}

#[tokio::test]
async fn test_stdio_responses_in_request_order() {
    let input = (1..=5)
        .map(|i| {
            if i == 1 {
                request(json!(i), "initialize", Value::Null)
            } else {
                search_call(json!(i), &format!("query {}", i))
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let ids: Vec<Value> = run_stdio(quick_server(), &input)
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, (1..=5).map(|i| json!(i)).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_stdio_lifecycle_errors() {
    let input = [
        search_call(json!("early"), "tensors"),
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string(),
        request(json!(1), "initialize", Value::Null),
        request(json!(2), "shutdown", Value::Null),
        search_call(json!("late"), "tensors"),
    ]
    .join("\n");

    let responses = run_stdio(quick_server(), &input).await;
    // the notification gets no line
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0].error_kind(), Some(ErrorKind::SequenceError));
    assert_eq!(responses[0].id, json!("early"));
    assert!(responses[1].result.is_some());
    assert_eq!(responses[2].result, Some(json!({})));
    assert_eq!(responses[3].error_kind(), Some(ErrorKind::SequenceError));
    assert_eq!(responses[3].id, json!("late"));
}

#[tokio::test]
async fn test_stdio_empty_input_exits_cleanly() {
    assert!(run_stdio(quick_server(), "").await.is_empty());
}

// -----------------------------------------------------------------------------
// Event stream
// -----------------------------------------------------------------------------

/// Incremental reader over an SSE response body
struct EventReader {
    body: Body,
    buffer: String,
}

impl EventReader {
    async fn open(app: &Router) -> Self {
        let response = app
            .clone()
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        Self {
            body: response.into_body(),
            buffer: String::new(),
        }
    }

    /// Next `(event, data)` pair, skipping keep-alive comments
    async fn next_event(&mut self) -> (String, String) {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                let mut event = String::new();
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        event = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                if event.is_empty() && data.is_empty() {
                    continue;
                }
                return (event, data);
            }

            let frame = self
                .body
                .frame()
                .await
                .expect("event stream ended")
                .expect("event stream failed");
            if let Ok(bytes) = frame.into_data() {
                self.buffer.push_str(std::str::from_utf8(&bytes).unwrap());
            }
        }
    }

    /// Whether the server ends the feed within a second
    async fn ends(&mut self) -> bool {
        loop {
            match tokio::time::timeout(Duration::from_secs(1), self.body.frame()).await {
                Ok(None) => return true,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) | Err(_) => return false,
            }
        }
    }

    /// Read discovery and endpoint events, returning the descriptor list and post URL
    async fn handshake(&mut self) -> (Value, String) {
        let (event, tools) = self.next_event().await;
        assert_eq!(event, sse::EVENT_TOOLS);
        let (event, endpoint) = self.next_event().await;
        assert_eq!(event, sse::EVENT_ENDPOINT);
        (serde_json::from_str(&tools).unwrap(), endpoint)
    }
}

async fn post(app: &Router, uri: &str, body: String) -> (StatusCode, Option<Response>) {
    post_bytes(app, uri, body.into_bytes()).await
}

async fn post_bytes(app: &Router, uri: &str, body: Vec<u8>) -> (StatusCode, Option<Response>) {
    let response = app
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let envelope = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, envelope)
}

async fn session_count(app: &Router) -> u64 {
    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    health["sessions"].as_u64().unwrap()
}

fn app(server: std::sync::Arc<ptsearch::McpServer>) -> Router {
    sse::router(server, Duration::from_secs(15))
}

#[tokio::test]
async fn test_sse_discovery_then_call() {
    let app = app(quick_server());
    let mut reader = EventReader::open(&app).await;
    let (tools, endpoint) = reader.handshake().await;

    assert_eq!(tools["tools"][0]["name"], "search_pytorch_docs");
    assert!(endpoint.starts_with("/messages?session_id="));
    assert_eq!(session_count(&app).await, 1);

    // discovery performed the handshake; calls work without initialize
    let (status, response) = post(&app, &endpoint, search_call(json!(1), "autograd")).await;
    assert_eq!(status, StatusCode::OK);
    let response = response.unwrap();
    assert_eq!(response.id, json!(1));
    assert_eq!(response.result.unwrap()["count"], 2);
}

#[tokio::test]
async fn test_descriptor_identical_across_transports() {
    let server = quick_server();

    let input = [
        request(json!(1), "initialize", Value::Null),
        request(json!(2), "list_tools", Value::Null),
    ]
    .join("\n");
    let responses = run_stdio(server.clone(), &input).await;
    let from_stdio: ToolDescriptor =
        serde_json::from_value(responses[1].result.as_ref().unwrap()["tools"][0].clone()).unwrap();

    let app = app(server.clone());
    let mut reader = EventReader::open(&app).await;
    let (tools, endpoint) = reader.handshake().await;
    let from_feed: ToolDescriptor = serde_json::from_value(tools["tools"][0].clone()).unwrap();

    let (_, listed) = post(&app, &endpoint, request(json!(3), "list_tools", Value::Null)).await;
    let from_post: ToolDescriptor =
        serde_json::from_value(listed.unwrap().result.unwrap()["tools"][0].clone()).unwrap();

    assert_eq!(from_stdio, from_feed);
    assert_eq!(from_feed, from_post);
    assert_eq!(&from_stdio, server.describe());
}

#[tokio::test]
async fn test_sse_concurrent_sessions_are_independent() {
    let app = app(server(
        &Config::default(),
        LengthEmbedder {
            delay: Duration::from_millis(50),
        },
        EchoStore,
    ));

    let mut first = EventReader::open(&app).await;
    let mut second = EventReader::open(&app).await;
    let (_, first_endpoint) = first.handshake().await;
    let (_, second_endpoint) = second.handshake().await;
    assert_ne!(first_endpoint, second_endpoint);
    assert_eq!(session_count(&app).await, 2);

    // same id on both sessions, different queries
    let (a, b) = tokio::join!(
        post(&app, &first_endpoint, search_call(json!(1), "alpha")),
        post(&app, &second_endpoint, search_call(json!(1), "beta gamma")),
    );

    let a = a.1.unwrap();
    let b = b.1.unwrap();
    assert_eq!(a.id, json!(1));
    assert_eq!(b.id, json!(1));
    assert_eq!(a.result.unwrap()["results"][0]["title"], "v5");
    assert_eq!(b.result.unwrap()["results"][0]["title"], "v10");
}

#[tokio::test]
async fn test_sse_status_codes() {
    let app = app(quick_server());
    let mut reader = EventReader::open(&app).await;
    let (_, endpoint) = reader.handshake().await;

    let (status, response) = post(&app, &endpoint, "{broken".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response.unwrap().error_kind(), Some(ErrorKind::MalformedMessage));

    let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let (status, response) = post(&app, &endpoint, notification).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(response.is_none());

    let (status, _) = post(
        &app,
        "/messages?session_id=00000000-0000-0000-0000-000000000000",
        search_call(json!(1), "q"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, response) = post(
        &app,
        &endpoint,
        request(json!(2), "call_tool", json!({"name": "search_pytorch_docs", "arguments": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.unwrap().error_kind(), Some(ErrorKind::InvalidArguments));
}

#[tokio::test]
async fn test_sse_undecodable_posts_get_envelopes() {
    let app = app(quick_server());
    let mut reader = EventReader::open(&app).await;
    let (_, endpoint) = reader.handshake().await;

    let (status, response) = post_bytes(&app, &endpoint, vec![0xFF, 0xFE, b'{']).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let response = response.unwrap();
    assert_eq!(response.error_kind(), Some(ErrorKind::MalformedMessage));
    assert_eq!(response.id, Value::Null);
    assert_eq!(response.error.unwrap().code, -32700);

    let (status, response) = post(&app, sse::MESSAGES_PATH, search_call(json!(1), "q")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response.unwrap().error_kind(), Some(ErrorKind::MalformedMessage));

    let (status, response) =
        post(&app, "/messages?session_id=nope", search_call(json!(1), "q")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response.unwrap().error_kind(), Some(ErrorKind::SequenceError));

    // the session is still usable
    let (status, response) = post(&app, &endpoint, search_call(json!(2), "autograd")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.unwrap().id, json!(2));
}

#[tokio::test]
async fn test_sse_feed_ends_after_shutdown() {
    let app = app(quick_server());
    let mut reader = EventReader::open(&app).await;
    let (_, endpoint) = reader.handshake().await;

    let (status, _) = post(&app, &endpoint, request(json!(1), "shutdown", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(reader.ends().await);

    drop(reader);
    assert_eq!(session_count(&app).await, 0);

    let (status, response) = post(&app, &endpoint, search_call(json!(2), "q")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response.unwrap().error_kind(), Some(ErrorKind::SequenceError));
}

#[tokio::test]
async fn test_sse_shutdown_then_sequence_error() {
    let app = app(quick_server());
    let mut reader = EventReader::open(&app).await;
    let (_, endpoint) = reader.handshake().await;

    let (status, response) =
        post(&app, &endpoint, request(json!(1), "shutdown", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.unwrap().result, Some(json!({})));

    let (status, response) = post(&app, &endpoint, search_call(json!(2), "q")).await;
    assert_eq!(status, StatusCode::OK);
    let response = response.unwrap();
    assert_eq!(response.error_kind(), Some(ErrorKind::SequenceError));
    assert_eq!(response.id, json!(2));
}

#[tokio::test]
async fn test_sse_disconnect_abandons_session() {
    let app = app(server(&Config::default(), StallingEmbedder, EchoStore));
    let mut reader = EventReader::open(&app).await;
    let (_, endpoint) = reader.handshake().await;

    let in_flight = tokio::spawn({
        let app = app.clone();
        let endpoint = endpoint.clone();
        async move { post(&app, &endpoint, search_call(json!(1), "q")).await.0 }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop(reader);

    assert_eq!(in_flight.await.unwrap(), StatusCode::GONE);
    assert_eq!(session_count(&app).await, 0);

    let (status, _) = post(&app, &endpoint, search_call(json!(2), "q")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
