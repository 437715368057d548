//! In-process embeddings with fastembed
//!
//! Inference is CPU-bound, so every call runs on the blocking thread pool.

use crate::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use ptsearch::EmbeddingProvider;
use std::path::PathBuf;
use std::sync::Arc;

/// Supported local models
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Model {
    /// all-MiniLM-L6-v2 (~80MB, 384 dimensions)
    #[default]
    AllMiniLmL6V2,
    /// BGE Small EN v1.5 (~130MB, 384 dimensions)
    BgeSmallEnV1_5,
}

impl Model {
    fn to_fastembed(self) -> EmbeddingModel {
        match self {
            Model::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            Model::BgeSmallEnV1_5 => EmbeddingModel::BGESmallENV15,
        }
    }

    /// Vector width
    pub fn dimensions(&self) -> usize {
        384
    }

    /// Model name recorded with stored embeddings
    pub fn name(&self) -> &'static str {
        match self {
            Model::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Model::BgeSmallEnV1_5 => "bge-small-en-v1.5",
        }
    }
}

impl std::str::FromStr for Model {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "minilm" | "default" => Ok(Model::AllMiniLmL6V2),
            "bge-small-en-v1.5" | "bge-small" | "bge" => Ok(Model::BgeSmallEnV1_5),
            _ => Err(EmbedError::ModelError(format!("Unknown model: {}", s))),
        }
    }
}

/// fastembed-backed provider
pub struct LocalEmbedder {
    model: Arc<TextEmbedding>,
    kind: Model,
}

impl LocalEmbedder {
    /// Load `kind`, downloading model files into `cache_dir` if needed
    pub fn new(kind: Model, cache_dir: Option<PathBuf>) -> Result<Self> {
        tracing::info!("Initializing local embedder with model: {}", kind.name());

        let mut options = InitOptions::new(kind.to_fastembed()).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model =
            TextEmbedding::try_new(options).map_err(|e| EmbedError::ModelError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            kind,
        })
    }

    /// Vector width for the loaded model
    pub fn dimensions(&self) -> usize {
        self.kind.dimensions()
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| EmbedError::EmbeddingFailed(e.to_string()))?
            .map_err(|e| EmbedError::EmbeddingFailed(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> ptsearch::Result<Vec<f32>> {
        let mut vectors = self.run(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::EmbeddingFailed("no embedding returned".into()).into())
    }

    async fn embed_batch(&self, texts: &[String]) -> ptsearch::Result<Vec<Vec<f32>>> {
        Ok(self.run(texts.to_vec()).await?)
    }

    fn model_name(&self) -> &str {
        self.kind.name()
    }
}
