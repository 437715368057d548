//! ptsearch MCP Server
//!
//! Exposes the `search_pytorch_docs` tool to AI agents over either transport.
//!
//! ## Usage
//!
//! ```bash
//! # STDIO (default), database at ~/.cache/ptsearch/index.sqlite
//! ptsearch-mcp
//!
//! # Event stream on port 5000
//! ptsearch-mcp --transport sse --host 127.0.0.1 --port 5000
//!
//! # Custom database and config
//! ptsearch-mcp --db-path /data/index.sqlite --config ptsearch.yaml --verbose
//! ```
//!
//! `OPENAI_API_KEY` must be set when the OpenAI provider is selected.
//!
//! ## MCP Configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "pytorch-docs": {
//!       "command": "ptsearch-mcp",
//!       "args": ["--db-path", "/path/to/index.sqlite"]
//!     }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use ptsearch::config::ProviderKind;
use ptsearch::transport::{sse, stdio, TransportKind};
use ptsearch::{Config, McpServer, SharedStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// ptsearch MCP Server - PyTorch documentation search for AI agents
#[derive(Parser, Debug)]
#[command(name = "ptsearch-mcp")]
#[command(
    author,
    version,
    about = "ptsearch MCP Server - Model Context Protocol interface for documentation search"
)]
struct Args {
    /// Transport to serve (stdio, sse)
    #[arg(long, short = 't', default_value_t = TransportKind::Stdio, env = "PTSEARCH_TRANSPORT")]
    transport: TransportKind,

    /// Bind host for the sse transport
    #[arg(long)]
    host: Option<String>,

    /// Bind port for the sse transport
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Path to the vector store database
    #[arg(long, short = 'd', env = "PTSEARCH_DB_PATH")]
    db_path: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, short = 'c', env = "PTSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Results returned when the caller does not ask for a count
    #[arg(long, short = 'n')]
    max_results: Option<u32>,

    /// Embedding provider (openai, local)
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Enable verbose logging (outputs to stderr)
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    /// Layer command-line flags over the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref path) = self.db_path {
            config.database.path = Some(path.clone());
        }
        if let Some(n) = self.max_results {
            config.search.default_results = n;
            config.search.max_results = config.search.max_results.max(n);
        }
        if let Some(provider) = self.provider {
            config.embedding.provider = provider;
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout belongs to the protocol; everything else goes to stderr
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(&args)?;
    let db_path = config.db_path();

    tracing::info!(
        transport = %args.transport,
        "Starting ptsearch MCP server with database: {}",
        db_path.display()
    );

    let store = Store::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let embedder =
        ptsearch_embed::from_config(&config.embedding).context("failed to set up embeddings")?;

    let server = Arc::new(McpServer::from_config(
        &config,
        embedder,
        Arc::new(SharedStore::new(store)),
    ));

    match args.transport {
        TransportKind::Stdio => stdio::run(server).await?,
        TransportKind::Sse => {
            let addr = format!("{}:{}", config.server.host, config.server.port);
            sse::serve(server, &config.server)
                .await
                .with_context(|| format!("failed to serve on {}", addr))?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["ptsearch-mcp"]).unwrap();
        assert_eq!(args.transport, TransportKind::Stdio);
        assert!(args.port.is_none());
        assert!(!args.verbose);

        let args = Args::try_parse_from([
            "ptsearch-mcp",
            "--transport",
            "sse",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "-n",
            "7",
            "--provider",
            "local",
        ])
        .unwrap();
        assert_eq!(args.transport, TransportKind::Sse);
        assert_eq!(args.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.max_results, Some(7));
        assert_eq!(args.provider, Some(ProviderKind::Local));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        assert!(Args::try_parse_from(["ptsearch-mcp", "--transport", "websocket"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 6000\nsearch:\n  max_results: 10").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from([
            "ptsearch-mcp",
            "--config",
            path.as_str(),
            "--port",
            "7000",
            "--db-path",
            "/tmp/ptsearch-test.sqlite",
            "--max-results",
            "15",
        ])
        .unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        args.apply(&mut config);

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.search.default_results, 15);
        assert_eq!(config.search.max_results, 15);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/ptsearch-test.sqlite"));
        assert!(config.validate().is_ok());
    }
}
