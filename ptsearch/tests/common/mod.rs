//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ptsearch::search::{Candidate, ContentKind};
use ptsearch::{Config, EmbeddingProvider, Error, McpServer, Result, VectorStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Embeds a query as `[char count]`, optionally after a delay
pub struct LengthEmbedder {
    pub delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for LengthEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![text.chars().count() as f32])
    }

    fn model_name(&self) -> &str {
        "length"
    }
}

/// Maps a few keywords onto axis-aligned vectors matching the fixture file
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(if lower.contains("dataloader") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("autograd") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        })
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// Never answers
pub struct StallingEmbedder;

#[async_trait]
impl EmbeddingProvider for StallingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![0.0])
    }

    fn model_name(&self) -> &str {
        "stalling"
    }
}

/// Returns a fixed candidate list, honouring `k` and the kind filter
pub struct ScriptedStore {
    pub candidates: Vec<Candidate>,
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn query(
        &self,
        _vector: &[f32],
        k: usize,
        kind: Option<ContentKind>,
    ) -> Result<Vec<Candidate>> {
        Ok(self
            .candidates
            .iter()
            .filter(|c| kind.map_or(true, |wanted| c.kind == wanted))
            .take(k)
            .cloned()
            .collect())
    }
}

/// Returns one candidate whose title reports the query vector
pub struct EchoStore;

#[async_trait]
impl VectorStore for EchoStore {
    async fn query(
        &self,
        vector: &[f32],
        _k: usize,
        _kind: Option<ContentKind>,
    ) -> Result<Vec<Candidate>> {
        Ok(vec![candidate(
            &format!("v{}", vector.first().copied().unwrap_or_default()),
            ContentKind::Text,
            0.5,
        )])
    }
}

/// Always fails
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn query(
        &self,
        _vector: &[f32],
        _k: usize,
        _kind: Option<ContentKind>,
    ) -> Result<Vec<Candidate>> {
        Err(Error::StoreError("connection refused".into()))
    }
}

pub fn candidate(title: &str, kind: ContentKind, score: f64) -> Candidate {
    Candidate {
        id: title.to_string(),
        title: Some(title.to_string()),
        source: format!("https://docs.example/{}", title),
        text: format!("Body of {}", title),
        kind,
        language: None,
        score,
    }
}

pub fn server(
    config: &Config,
    embedder: impl EmbeddingProvider + 'static,
    store: impl VectorStore + 'static,
) -> Arc<McpServer> {
    Arc::new(McpServer::from_config(config, Arc::new(embedder), Arc::new(store)))
}

pub fn request(id: Value, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

pub fn search_call(id: Value, query: &str) -> String {
    request(
        id,
        "call_tool",
        json!({"name": "search_pytorch_docs", "arguments": {"query": query}}),
    )
}

pub fn fixture_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
