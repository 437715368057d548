//! # ptsearch-embed - Embedding providers for ptsearch
//!
//! Implementations of [`ptsearch::EmbeddingProvider`]:
//!
//! - [`OpenAiEmbedder`] calls an OpenAI-compatible `/embeddings` endpoint
//!   (default `text-embedding-3-large`, 3072 dimensions)
//! - `LocalEmbedder` runs a fastembed model in-process (feature `local`)
//! - [`CachedEmbedder`] wraps either one with an on-disk cache
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ptsearch_embed::{CachedEmbedder, OpenAiEmbedder};
//!
//! let api = OpenAiEmbedder::from_env("text-embedding-3-large")?;
//! let embedder = CachedEmbedder::new(api, "/tmp/ptsearch-cache");
//! let vector = embedder.embed("how to use DataLoader").await?;
//! ```

mod cache;
#[cfg(feature = "local")]
mod local;
mod openai;

pub use cache::{CacheStats, CachedEmbedder};
#[cfg(feature = "local")]
pub use local::{LocalEmbedder, Model};
pub use openai::{OpenAiEmbedder, DEFAULT_BASE_URL, ENV_API_KEY};

use ptsearch::config::{EmbeddingConfig, ProviderKind};
use ptsearch::EmbeddingProvider;
use std::sync::Arc;
use thiserror::Error;

/// Embedding error types
#[derive(Error, Debug)]
pub enum EmbedError {
    /// No API key configured
    #[error("{0} not found. Set it in the environment to use the OpenAI provider")]
    MissingApiKey(&'static str),

    /// Model not found or failed to load
    #[error("Model error: {0}")]
    ModelError(String),

    /// Transport failure talking to the embedding API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Embedding API returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Embedding generation failed or returned an unusable shape
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for embedding operations
pub type Result<T> = std::result::Result<T, EmbedError>;

impl From<EmbedError> for ptsearch::Error {
    fn from(err: EmbedError) -> Self {
        ptsearch::Error::EmbeddingError(err.to_string())
    }
}

/// Build the provider selected by `config`, wrapped in the cache when enabled.
///
/// The OpenAI provider reads its key from `$OPENAI_API_KEY` and fails here
/// when it is missing, so a misconfigured server never starts.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderKind::OpenAi => {
            let api = OpenAiEmbedder::from_env(config.model.clone())?
                .with_dimensions(config.dimensions);
            Ok(wrap(api, config))
        }
        #[cfg(feature = "local")]
        ProviderKind::Local => {
            let model: Model = config.model.parse()?;
            Ok(wrap(LocalEmbedder::new(model, None)?, config))
        }
        #[cfg(not(feature = "local"))]
        ProviderKind::Local => Err(EmbedError::ModelError(
            "local embeddings need ptsearch-embed built with the `local` feature".into(),
        )),
    }
}

fn wrap<P>(provider: P, config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider>
where
    P: EmbeddingProvider + 'static,
{
    if config.cache {
        Arc::new(CachedEmbedder::new(provider, config.cache_dir()))
    } else {
        Arc::new(provider)
    }
}
