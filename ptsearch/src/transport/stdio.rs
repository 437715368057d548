//! STDIO transport
//!
//! One message per line in, exactly one response line out per request, in
//! request order. A malformed line is answered with a `MalformedMessage`
//! error and reading continues. End of input terminates the session.

use crate::error::Result;
use crate::mcp::{McpServer, ProtocolError, Response, Session, SessionState};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Serve one session on the process's stdin and stdout
pub async fn run(server: Arc<McpServer>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(server, stdin, stdout).await
}

/// Serve one session on an arbitrary reader/writer pair
pub async fn serve<R, W>(server: Arc<McpServer>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = Mutex::new(Session::new());
    let mut buf = Vec::new();

    tracing::info!("stdio session started");

    let outcome = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::info!("EOF received, shutting down");
                break Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Read error: {}", e);
                break Err(e.into());
            }
        }

        // undecodable bytes are a malformed message, not a broken channel
        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!("Received: {}", line);
                server.handle_message(&session, line).await
            }
            Err(e) => {
                tracing::warn!("Malformed message: {}", e);
                Some(Response::failure(ProtocolError::malformed(format!(
                    "Message is not valid UTF-8: {}",
                    e
                ))))
            }
        };
        let Some(response) = response else {
            continue;
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => break Err(e.into()),
        };
        if let Err(e) = write_line(&mut writer, &encoded).await {
            tracing::error!("Write error: {}", e);
            break Err(e.into());
        }
        tracing::debug!("Sent: {}", encoded);
    };

    let clean = session
        .lock()
        .map(|s| s.state() == SessionState::Terminated)
        .unwrap_or(false);
    server.close_session(&session).await;
    tracing::info!(clean_shutdown = clean, "stdio session closed");

    outcome
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
