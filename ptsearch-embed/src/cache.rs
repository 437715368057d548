//! On-disk embedding cache
//!
//! Each entry is a small JSON file named by the SHA-256 of
//! `model + "\n" + text`. The cache never turns a working provider into a
//! failing one: unreadable, corrupt or unwritable entries count as misses.
//! Entry I/O goes through `tokio::fs`.

use async_trait::async_trait;
use ptsearch::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    model: String,
    embedding: Vec<f32>,
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from disk
    pub hits: u64,
    /// Lookups that went to the wrapped provider
    pub misses: u64,
}

/// Wraps a provider with a file-per-entry cache
pub struct CachedEmbedder<P> {
    inner: P,
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: EmbeddingProvider> CachedEmbedder<P> {
    /// Wrap `inner`, storing entries under `dir`
    pub fn new(inner: P, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => tracing::info!("Embedding cache initialized at {}", dir.display()),
            Err(e) => tracing::warn!("Embedding cache disabled at {}: {}", dir.display(), e),
        }
        Self {
            inner,
            dir,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The wrapped provider
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Counters since construction
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn entry_path(&self, text: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update(b"\n");
        hasher.update(text.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    async fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        let path = self.entry_path(text);
        let found = tokio::fs::read(&path)
            .await
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
            .filter(|entry| entry.model == self.inner.model_name() && !entry.embedding.is_empty())
            .map(|entry| entry.embedding);

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    async fn store(&self, text: &str, embedding: &[f32]) {
        let entry = CacheEntry {
            model: self.inner.model_name().to_string(),
            embedding: embedding.to_vec(),
        };
        let path = self.entry_path(text);
        let written = match serde_json::to_vec(&entry) {
            Ok(bytes) => tokio::fs::write(&path, bytes).await,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = written {
            tracing::warn!("Failed to write cache entry {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<P> {
    async fn embed(&self, text: &str) -> ptsearch::Result<Vec<f32>> {
        if let Some(hit) = self.lookup(text).await {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.store(text, &embedding).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> ptsearch::Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.lookup(text).await);
        }

        let missing: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let uncached: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&uncached).await?;
            if fresh.len() != uncached.len() {
                return Err(ptsearch::Error::EmbeddingError(format!(
                    "expected {} embeddings, got {}",
                    uncached.len(),
                    fresh.len()
                )));
            }
            for (i, embedding) in missing.into_iter().zip(fresh) {
                self.store(&texts[i], &embedding).await;
                out[i] = Some(embedding);
            }
        }

        tracing::debug!(
            batch = texts.len(),
            hits = self.hits.load(Ordering::Relaxed),
            misses = self.misses.load(Ordering::Relaxed),
            "Embedding cache batch"
        );

        Ok(out.into_iter().flatten().collect())
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Embeds as `[len]` and counts calls
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for Counting {
        async fn embed(&self, text: &str) -> ptsearch::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }

        async fn embed_batch(&self, texts: &[String]) -> ptsearch::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct Broken;

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> ptsearch::Result<Vec<f32>> {
            Err(ptsearch::Error::EmbeddingError("offline".into()))
        }

        fn model_name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_second_lookup_is_a_hit() {
        let dir = TempDir::new().unwrap();
        let cached = CachedEmbedder::new(Counting::default(), dir.path());

        assert_eq!(cached.embed("tensor").await.unwrap(), vec![6.0]);
        assert_eq!(cached.embed("tensor").await.unwrap(), vec![6.0]);

        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_entries_survive_restart() {
        let dir = TempDir::new().unwrap();
        CachedEmbedder::new(Counting::default(), dir.path())
            .embed("persisted")
            .await
            .unwrap();

        let reopened = CachedEmbedder::new(Counting::default(), dir.path());
        assert_eq!(reopened.embed("persisted").await.unwrap(), vec![9.0]);
        assert_eq!(reopened.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_only_embeds_misses() {
        let dir = TempDir::new().unwrap();
        let cached = CachedEmbedder::new(Counting::default(), dir.path());
        cached.embed("bb").await.unwrap();

        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let vectors = cached.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
        // one single embed, then one batch of the two misses
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.inner().texts.load(Ordering::SeqCst), 3);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 3 });
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cached = CachedEmbedder::new(Counting::default(), dir.path());
        std::fs::write(cached.entry_path("oops"), b"not json").unwrap();

        assert_eq!(cached.embed("oops").await.unwrap(), vec![4.0]);
        assert_eq!(cached.stats().misses, 1);
        // the entry was rewritten
        assert_eq!(cached.embed("oops").await.unwrap(), vec![4.0]);
        assert_eq!(cached.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_unwritable_dir_still_embeds() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let cached = CachedEmbedder::new(Counting::default(), blocker.join("cache"));
        assert_eq!(cached.embed("abc").await.unwrap(), vec![3.0]);
        assert_eq!(cached.embed("abc").await.unwrap(), vec![3.0]);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_errors_pass_through() {
        let dir = TempDir::new().unwrap();
        let cached = CachedEmbedder::new(Broken, dir.path());
        let err = cached.embed("x").await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_embeds_on_single_thread_runtime() {
        let dir = TempDir::new().unwrap();
        let cached = std::sync::Arc::new(CachedEmbedder::new(Counting::default(), dir.path()));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let cached = std::sync::Arc::clone(&cached);
            tasks.spawn(async move { cached.embed(&"x".repeat(i + 1)).await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap().is_ok());
        }
        assert_eq!(cached.stats(), CacheStats { hits: 0, misses: 8 });

        for i in 0..8 {
            let text = "x".repeat(i + 1);
            assert_eq!(cached.embed(&text).await.unwrap(), vec![(i + 1) as f32]);
        }
        assert_eq!(cached.stats(), CacheStats { hits: 8, misses: 8 });
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_key_depends_on_model() {
        let dir = TempDir::new().unwrap();
        let a = CachedEmbedder::new(Counting::default(), dir.path());
        let b = CachedEmbedder::new(Broken, dir.path());
        assert_ne!(a.entry_path("same"), b.entry_path("same"));
        assert_eq!(a.entry_path("same"), a.entry_path("same"));
    }
}
