//! Message envelopes and the protocol error taxonomy
//!
//! Requests are `{jsonrpc, id, method, params}` objects; responses carry
//! either `result` or `error: {code, kind, message}`. Both transports encode
//! and decode through this module so the wire shape cannot drift.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version reported by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC version tag written on every response
pub const JSONRPC_VERSION: &str = "2.0";

/// Prefix of client notifications, which never get a response
pub const NOTIFICATION_PREFIX: &str = "notifications/";

/// The fixed set of request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Handshake
    Initialize,
    /// Capability discovery
    ListTools,
    /// Tool invocation
    CallTool,
    /// Orderly end of session
    Shutdown,
}

impl Method {
    /// Parse a method name, accepting the MCP-style aliases
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(Method::Initialize),
            "list_tools" | "tools/list" => Some(Method::ListTools),
            "call_tool" | "tools/call" => Some(Method::CallTool),
            "shutdown" => Some(Method::Shutdown),
            _ => None,
        }
    }

    /// Canonical method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::ListTools => "list_tools",
            Method::CallTool => "call_tool",
            Method::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request that expects exactly one response
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Caller-supplied correlation token (string or number)
    pub id: Value,
    /// Requested method
    pub method: Method,
    /// Method-specific parameters (`Null` when absent)
    pub params: Value,
}

/// Anything that decoded successfully off the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A request with an id
    Request(CallRequest),
    /// A `notifications/*` message without an id
    Notification {
        /// Notification method name
        method: String,
    },
}

/// Error categories shared by both transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Params failed schema validation
    InvalidArguments,
    /// Message is illegal in the current session state
    SequenceError,
    /// Input could not be decoded
    MalformedMessage,
    /// Embedding provider or vector store failed or timed out
    UpstreamUnavailable,
    /// Anything unanticipated inside the call handler
    InternalFault,
}

impl ErrorKind {
    /// JSON-RPC numeric code
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::MalformedMessage => -32700,
            ErrorKind::InvalidArguments => -32602,
            ErrorKind::InternalFault => -32603,
            ErrorKind::UpstreamUnavailable => -32001,
            ErrorKind::SequenceError => -32002,
        }
    }
}

/// A typed protocol failure, always delivered as a normal response
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    /// Error category
    pub kind: ErrorKind,
    /// Human readable detail
    pub message: String,
    /// Id of the request this answers, if one could be recovered
    pub request_id: Option<Value>,
}

impl ProtocolError {
    /// Create an error not yet tied to a request
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_id: None,
        }
    }

    /// Undecodable input
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedMessage, message)
    }

    /// Params failed validation
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArguments, message)
    }

    /// Illegal for the current session state
    pub fn sequence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SequenceError, message)
    }

    /// Upstream collaborator failure
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, message)
    }

    /// Unanticipated failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalFault, message)
    }

    /// Attach the id of the request this error answers
    pub fn with_request_id(mut self, id: Value) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Wire form of this error
    pub fn to_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.kind.code(),
            kind: self.kind,
            message: self.message.clone(),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ProtocolError {}

impl From<Error> for ProtocolError {
    fn from(err: Error) -> Self {
        if err.is_upstream() {
            ProtocolError::upstream(err.to_string())
        } else {
            ProtocolError::internal(err.to_string())
        }
    }
}

/// Error object inside a response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// JSON-RPC numeric code
    pub code: i32,
    /// Error category
    pub kind: ErrorKind,
    /// Human readable detail
    pub message: String,
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Id of the answered request, `null` when none could be recovered
    #[serde(default)]
    pub id: Value,
    /// Result (present on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Create a successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response from a protocol error
    pub fn failure(error: ProtocolError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: error.request_id.clone().unwrap_or(Value::Null),
            result: None,
            error: Some(error.to_object()),
        }
    }

    /// Error kind, if this is a failure
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Decode one raw message.
///
/// Errors are always `MalformedMessage`; they carry the request id when the
/// message was valid JSON with a usable id.
pub fn decode(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ProtocolError::malformed(format!("Parse error: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(ProtocolError::malformed("Message must be a JSON object"));
    };

    decode_object(object)
}

fn decode_object(mut object: Map<String, Value>) -> Result<Inbound, ProtocolError> {
    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(id @ (Value::String(_) | Value::Number(_))) => Some(id),
        Some(_) => {
            return Err(ProtocolError::malformed(
                "Request id must be a string or a number",
            ))
        }
    };

    let with_id = |err: ProtocolError| match &id {
        Some(id) => err.with_request_id(id.clone()),
        None => err,
    };

    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => return Err(with_id(ProtocolError::malformed("Method must be a string"))),
        None => return Err(with_id(ProtocolError::malformed("Missing method"))),
    };

    let Some(id) = id else {
        if method.starts_with(NOTIFICATION_PREFIX) {
            return Ok(Inbound::Notification { method });
        }
        return Err(ProtocolError::malformed(format!(
            "Missing request id for method: {}",
            method
        )));
    };

    let Some(parsed) = Method::parse(&method) else {
        return Err(ProtocolError::malformed(format!("Unknown method: {}", method))
            .with_request_id(id));
    };

    Ok(Inbound::Request(CallRequest {
        id,
        method: parsed,
        params: object.remove("params").unwrap_or(Value::Null),
    }))
}
