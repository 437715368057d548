//! Configuration for ptsearch
//!
//! Values come from three layers, lowest priority first: built-in defaults,
//! an optional YAML file, and environment variables. Binaries apply their own
//! command-line flags on top and then call [`Config::validate`].

use crate::error::{Error, Result};
use crate::search::{BoostFactors, Ranker, TieBreak, DEFAULT_SNIPPET_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default result count
pub const ENV_MAX_RESULTS: &str = "MAX_RESULTS";
/// Environment variable overriding the database path
pub const ENV_DB_PATH: &str = "PTSEARCH_DB_PATH";
/// Environment variable the binaries read for the YAML config file path
pub const ENV_CONFIG: &str = "PTSEARCH_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exposed tool metadata
    pub tool: ToolConfig,
    /// Result count and snippet settings
    pub search: SearchConfig,
    /// Ranking boosts and tie-break policy
    pub ranking: RankingConfig,
    /// Upstream call budgets
    pub upstream: UpstreamConfig,
    /// Event-stream bind settings
    pub server: ServerConfig,
    /// Embedding provider selection
    pub embedding: EmbeddingConfig,
    /// Vector store location
    pub database: DatabaseConfig,
}

/// Metadata for the single exposed tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Tool name clients must use in `call_tool`
    pub name: String,
    /// Human description shown to the agent
    pub description: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: "search_pytorch_docs".to_string(),
            description: "Search PyTorch documentation or examples. Call when the user asks \
                          about a PyTorch API, error message, best-practice or needs a code \
                          snippet."
                .to_string(),
        }
    }
}

/// Result count and formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when the caller does not ask for a count
    pub default_results: u32,
    /// Largest count a caller may ask for
    pub max_results: u32,
    /// Snippet length in characters
    pub snippet_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_results: 5,
            max_results: 20,
            snippet_length: DEFAULT_SNIPPET_LENGTH,
        }
    }
}

/// Ranking tunables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Multiplicative boosts keyed by intent then content kind
    pub boosts: BoostFactors,
    /// Order for candidates with equal boosted and raw scores
    pub tiebreak: TieBreak,
}

/// Budgets for calls to the embedding provider and vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Embedding call budget in milliseconds
    pub embed_timeout_ms: u64,
    /// Vector store query budget in milliseconds
    pub store_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            embed_timeout_ms: 10_000,
            store_timeout_ms: 5_000,
        }
    }
}

impl UpstreamConfig {
    /// Embedding budget as a `Duration`
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    /// Store budget as a `Duration`
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Event-stream server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Interval between keep-alive comments on open event streams
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            keep_alive_secs: 15,
        }
    }
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI embeddings API
    #[default]
    OpenAi,
    /// Local fastembed model
    Local,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "local" => Ok(ProviderKind::Local),
            _ => Err(Error::ConfigError(format!("Unknown embedding provider: {}", s))),
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend
    pub provider: ProviderKind,
    /// Model name passed to the backend
    pub model: String,
    /// Expected vector width
    pub dimensions: usize,
    /// Whether to cache query embeddings on disk
    pub cache: bool,
    /// Cache directory; defaults under the data directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            cache: true,
            cache_dir: None,
        }
    }
}

impl EmbeddingConfig {
    /// Cache directory, resolved against the default data directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| crate::default_data_dir().join("embedding_cache"))
    }
}

/// Vector store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to [`crate::default_db_path`]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration: defaults, then `path`, then env.
    ///
    /// `path` is resolved by the caller; the binaries take it from
    /// `--config` or [`ENV_CONFIG`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(file) => {
                tracing::debug!("Loading config from {}", file.display());
                Self::from_file(file)?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse YAML text; missing keys take their defaults
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(ENV_MAX_RESULTS) {
            self.search.default_results = value.trim().parse().map_err(|_| {
                Error::ConfigError(format!("{} must be an integer, got {:?}", ENV_MAX_RESULTS, value))
            })?;
        }
        if let Some(path) = std::env::var_os(ENV_DB_PATH) {
            self.database.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check invariants the rest of the system relies on
    pub fn validate(&self) -> Result<()> {
        if self.tool.name.trim().is_empty() {
            return Err(Error::ConfigError("tool.name must not be empty".into()));
        }
        if self.search.max_results < 1 {
            return Err(Error::ConfigError("search.max_results must be at least 1".into()));
        }
        if self.search.default_results < 1 || self.search.default_results > self.search.max_results {
            return Err(Error::ConfigError(format!(
                "search.default_results must be between 1 and {}, got {}",
                self.search.max_results, self.search.default_results
            )));
        }
        if self.upstream.embed_timeout_ms == 0 || self.upstream.store_timeout_ms == 0 {
            return Err(Error::ConfigError("upstream timeouts must be positive".into()));
        }
        if self.server.keep_alive_secs == 0 {
            return Err(Error::ConfigError("server.keep_alive_secs must be positive".into()));
        }
        self.ranking.boosts.validate()
    }

    /// Database path, resolved against the default location
    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(crate::default_db_path)
    }

    /// Build the ranker described by this configuration
    pub fn ranker(&self) -> Ranker {
        Ranker::new(self.ranking.boosts)
            .with_tiebreak(self.ranking.tiebreak)
            .with_snippet_length(self.search.snippet_length)
    }
}
