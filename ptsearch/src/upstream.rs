//! Upstream collaborators the call handler depends on
//!
//! Implementations must be safe to share between concurrently running
//! sessions; the handler holds them behind `Arc`.

use crate::error::Result;
use crate::search::{Candidate, ContentKind};
use async_trait::async_trait;

/// Produces a vector for a piece of text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Model identifier recorded alongside stored embeddings
    fn model_name(&self) -> &str;
}

/// Supplies nearest-neighbour candidates for a query vector
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `k` candidates, optionally restricted to one content kind.
    ///
    /// Results are usually sorted by similarity but callers must not rely on it.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        kind: Option<ContentKind>,
    ) -> Result<Vec<Candidate>>;
}
