//! # ptsearch - PyTorch documentation search over a tool protocol
//!
//! ptsearch exposes one search tool to LLM agents and serves it over two
//! transports with identical semantics:
//! - **STDIO**: newline-delimited JSON-RPC on stdin/stdout, one session per process
//! - **Event stream**: SSE discovery feed plus HTTP call exchanges, one session per client
//!
//! Both transports drive the same [`mcp::Session`] state machine and the same
//! [`mcp::CallHandler`], which embeds the query, pulls candidates from the
//! vector store and ranks them with the intent-aware [`search::Ranker`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ptsearch::{Config, McpServer, SharedStore, Store};
//! use std::sync::Arc;
//!
//! let config = Config::load(None)?;
//! let store = SharedStore::new(Store::open(config.db_path())?);
//! let server = McpServer::from_config(&config, Arc::new(embedder), Arc::new(store));
//! ptsearch::transport::stdio::run(Arc::new(server)).await?;
//! ```

pub mod config;
pub mod error;
pub mod indexer;
pub mod mcp;
pub mod search;
pub mod store;
pub mod transport;
pub mod upstream;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use indexer::{ChunkLoader, IndexStats};
pub use mcp::{CallHandler, McpServer, ToolDescriptor};
pub use search::{classify_intent, ContentKind, Intent, Ranker};
pub use store::{SharedStore, Store};
pub use upstream::{EmbeddingProvider, VectorStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default data directory (embedding cache and other generated files)
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("ptsearch")
}

/// Default database path
pub fn default_db_path() -> std::path::PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("ptsearch")
        .join("index.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(default_db_path().ends_with("ptsearch/index.sqlite"));
        assert!(default_data_dir().ends_with("ptsearch"));
    }
}
