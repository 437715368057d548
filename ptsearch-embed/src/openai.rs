//! OpenAI-compatible HTTP embeddings

use crate::{EmbedError, Result};
use async_trait::async_trait;
use ptsearch::EmbeddingProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY: usize = 500;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embeds text through an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    /// Create an embedder; fails when `api_key` is empty
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EmbedError::MissingApiKey(ENV_API_KEY));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let model = model.into();
        tracing::info!("OpenAI embedder initialized with model: {}", model);

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model,
            dimensions: None,
        })
    }

    /// Create an embedder with the key from `$OPENAI_API_KEY`
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        Self::new(api_key, model)
    }

    /// Point at a different API root (proxies, compatible servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask the API to shorten vectors to `dimensions`
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Embed a batch of texts, one vector per input in input order
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(count = texts.len(), model = %self.model, "Requesting embeddings");

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dimensions,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if let Some((cut, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
                body.truncate(cut);
            }
            tracing::warn!(status = status.as_u16(), "Embedding request failed");
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::EmbeddingFailed(format!("malformed response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> ptsearch::Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::EmbeddingFailed("empty response".into()).into())
    }

    async fn embed_batch(&self, texts: &[String]) -> ptsearch::Result<Vec<Vec<f32>>> {
        Ok(self.embed_texts(texts).await?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    /// Serve `app` on an ephemeral port and return its base URL
    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Answers with `[input length, index]` per input, in reverse order
    async fn fake_embeddings(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| {
                let len = text.as_str().unwrap_or_default().len();
                json!({"index": i, "embedding": [len as f32, i as f32]})
            })
            .collect();
        (StatusCode::OK, Json(json!({"data": data, "model": body["model"]})))
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = OpenAiEmbedder::new("  ", "text-embedding-3-large")
            .err()
            .unwrap();
        assert!(matches!(err, EmbedError::MissingApiKey(ENV_API_KEY)));
    }

    #[tokio::test]
    async fn test_batch_restores_input_order() {
        let url = spawn(Router::new().route("/embeddings", post(fake_embeddings))).await;
        let embedder = OpenAiEmbedder::new("sk-test", "test-model")
            .unwrap()
            .with_base_url(format!("{}/", url));

        let texts = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(
            vectors,
            vec![vec![1.0, 0.0], vec![3.0, 1.0], vec![2.0, 2.0]]
        );
        assert_eq!(embedder.embed("four").await.unwrap(), vec![4.0, 0.0]);
        assert_eq!(embedder.model_name(), "test-model");
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let url = spawn(Router::new().route("/embeddings", post(fake_embeddings))).await;
        let embedder = OpenAiEmbedder::new("sk-wrong", "test-model")
            .unwrap()
            .with_base_url(url);

        let err = embedder.embed_texts(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let app = Router::new().route(
            "/embeddings",
            post(|| async { Json(json!({"unexpected": true})) }),
        );
        let url = spawn(app).await;
        let embedder = OpenAiEmbedder::new("sk-test", "test-model")
            .unwrap()
            .with_base_url(url);

        let err = embedder.embed("x").await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        // no server behind this address; an empty batch must not connect
        let embedder = OpenAiEmbedder::new("sk-test", "test-model")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(embedder.embed_texts(&[]).await.unwrap().is_empty());
    }
}
