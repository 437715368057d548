//! Transport-independent call handler
//!
//! Owns the answer to "what happens when a method runs". Transports never
//! see embeddings or candidates, only a `Value` or a [`ProtocolError`].

use super::protocol::{Method, ProtocolError, PROTOCOL_VERSION};
use super::tools::ToolDescriptor;
use crate::config::Config;
use crate::error::Error;
use crate::search::{classify_intent, Intent, Ranker, ResultItem};
use crate::upstream::{EmbeddingProvider, VectorStore};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Default embedding budget
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(10);
/// Default vector store budget
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a successful `call_tool`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// The query, trimmed
    pub query: String,
    /// Intent the ranking used
    pub intent: Intent,
    /// Number of results
    pub count: usize,
    /// Ranked results, best first
    pub results: Vec<ResultItem>,
}

/// Orchestrates validation, embedding, retrieval and ranking
pub struct CallHandler {
    descriptor: Arc<ToolDescriptor>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    ranker: Ranker,
    embed_timeout: Duration,
    store_timeout: Duration,
}

impl CallHandler {
    /// Create a handler with the default ranker and budgets
    pub fn new(
        descriptor: Arc<ToolDescriptor>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            descriptor,
            embedder,
            store,
            ranker: Ranker::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Create a handler configured from `config`
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(Arc::new(ToolDescriptor::from_config(config)), embedder, store)
            .with_ranker(config.ranker())
            .with_timeouts(config.upstream.embed_timeout(), config.upstream.store_timeout())
    }

    /// Replace the ranker
    pub fn with_ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    /// Set the upstream budgets
    pub fn with_timeouts(mut self, embed: Duration, store: Duration) -> Self {
        self.embed_timeout = embed;
        self.store_timeout = store;
        self
    }

    /// The exposed tool
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Discovery payload, shared by `list_tools` and the event-stream feed
    pub fn list_tools(&self) -> Value {
        json!({ "tools": [self.descriptor.as_ref()] })
    }

    /// Run one method.
    ///
    /// Panics and unexpected errors are converted to `InternalFault` here and
    /// never reach the transport.
    pub async fn handle(&self, method: Method, params: &Value) -> Result<Value, ProtocolError> {
        match AssertUnwindSafe(self.dispatch(method, params))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(method = method.as_str(), "Call handler panicked: {}", message);
                Err(ProtocolError::internal(format!("Internal fault: {}", message)))
            }
        }
    }

    async fn dispatch(&self, method: Method, params: &Value) -> Result<Value, ProtocolError> {
        match method {
            Method::Initialize => Ok(self.initialize()),
            Method::ListTools => Ok(self.list_tools()),
            Method::CallTool => {
                let result = self.call(params).await?;
                serde_json::to_value(result).map_err(|e| ProtocolError::from(Error::from(e)))
            }
            Method::Shutdown => {
                self.shutdown().await;
                Ok(json!({}))
            }
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "ptsearch",
                "version": crate::VERSION
            }
        })
    }

    /// Execute a search call
    pub async fn call(&self, params: &Value) -> Result<CallResult, ProtocolError> {
        let args = self.descriptor.validate_call(params)?;
        let intent = classify_intent(&args.query);

        let vector = bounded(
            "embedding provider",
            self.embed_timeout,
            self.embedder.embed(&args.query),
        )
        .await?;

        let candidates = bounded(
            "vector store",
            self.store_timeout,
            self.store.query(&vector, args.num_results, args.filter),
        )
        .await?;

        let results = self
            .ranker
            .rank(&args.query, intent, candidates, args.num_results);

        tracing::info!(
            query = %args.query,
            intent = intent.as_str(),
            count = results.len(),
            "Search complete"
        );

        Ok(CallResult {
            query: args.query,
            intent,
            count: results.len(),
            results,
        })
    }

    /// Release handler resources; safe to call in any state
    pub async fn shutdown(&self) {
        tracing::info!("Call handler shutting down");
    }
}

/// Await an upstream call within `budget`; any failure is `UpstreamUnavailable`
async fn bounded<T, F>(what: &'static str, budget: Duration, call: F) -> Result<T, ProtocolError>
where
    F: Future<Output = crate::Result<T>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::warn!("{} failed: {}", what, err);
            Err(ProtocolError::upstream(format!("{} failed: {}", what, err)))
        }
        Err(_) => {
            let err = Error::Timeout { what, after: budget };
            tracing::warn!("{}", err);
            Err(ProtocolError::from(err))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
