//! Transports for the tool protocol
//!
//! - [`stdio`] - newline-delimited messages on a duplex byte stream, one session
//! - [`sse`] - discovery over a server-sent event feed, calls over HTTP POST,
//!   one session per connected client
//!
//! Both hand raw messages to [`crate::mcp::McpServer`] and differ only in framing.

pub mod sse;
pub mod stdio;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Transport selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON on stdin/stdout
    #[default]
    Stdio,
    /// Server-sent events plus HTTP POST
    Sse,
}

impl TransportKind {
    /// Lowercase name as accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            _ => Err(Error::ConfigError(format!(
                "Unknown transport: {} (expected stdio or sse)",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_from_str() {
        assert_eq!("stdio".parse::<TransportKind>().unwrap(), TransportKind::Stdio);
        assert_eq!("SSE".parse::<TransportKind>().unwrap(), TransportKind::Sse);
        assert!("websocket".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::default().to_string(), "stdio");
    }
}
