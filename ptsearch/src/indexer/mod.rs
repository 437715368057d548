//! Chunk indexer
//!
//! Loads pre-chunked documentation records from a JSON array into the
//! [`Store`]. Records that arrive without an embedding are embedded through
//! the configured provider in batches. A bad record is counted and skipped;
//! it never aborts the load.

use crate::error::{Error, Result};
use crate::search::ContentKind;
use crate::store::{ChunkRecord, Store};
use crate::upstream::EmbeddingProvider;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};

/// Records embedded per provider call
pub const EMBED_BATCH_SIZE: usize = 20;

/// Model label recorded for embeddings supplied in the input file
pub const EXTERNAL_MODEL: &str = "external";

/// Statistics from a load
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Records found in the input
    pub records_read: usize,
    /// Records written to the store
    pub records_indexed: usize,
    /// Records whose embedding was generated during the load
    pub records_embedded: usize,
    /// Records skipped because of an error
    pub errors: usize,
    /// Time taken
    pub duration: Duration,
}

/// Progress callback for loading
pub trait IndexProgress: Send {
    /// Called once per input record
    fn on_record(&mut self, id: &str, status: RecordStatus);
    /// Called when the load is complete
    fn on_complete(&mut self, stats: &IndexStats);
}

/// Outcome for one record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordStatus {
    /// Stored with the embedding from the input
    Indexed,
    /// Embedded during the load, then stored
    Embedded,
    /// Skipped
    Error(String),
}

struct NoopProgress;

impl IndexProgress for NoopProgress {
    fn on_record(&mut self, _id: &str, _status: RecordStatus) {}
    fn on_complete(&mut self, _stats: &IndexStats) {}
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    id: String,
    text: String,
    #[serde(default)]
    metadata: RawMetadata,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    title: Option<String>,
    #[serde(default)]
    source: String,
    chunk_type: Option<String>,
    language: Option<String>,
}

impl RawChunk {
    fn into_record(self) -> Result<(ChunkRecord, Option<Vec<f32>>)> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidRecord("record id must not be empty".into()));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidRecord(format!("record {} has no text", self.id)));
        }
        let kind = match self.metadata.chunk_type.as_deref() {
            None | Some("") => ContentKind::Text,
            Some(kind) => kind.parse()?,
        };
        let embedding = self.embedding.filter(|e| !e.is_empty());
        Ok((
            ChunkRecord {
                id: self.id,
                title: self.metadata.title,
                source: self.metadata.source,
                text: self.text,
                kind,
                language: self.metadata.language,
            },
            embedding,
        ))
    }
}

/// Loads chunk files into a store
pub struct ChunkLoader<'a> {
    store: &'a Store,
    embedder: Option<&'a dyn EmbeddingProvider>,
    batch_size: usize,
    reset: bool,
}

impl<'a> ChunkLoader<'a> {
    /// Create a loader that only accepts records with embeddings
    pub fn new(store: &'a Store) -> Self {
        ChunkLoader {
            store,
            embedder: None,
            batch_size: EMBED_BATCH_SIZE,
            reset: false,
        }
    }

    /// Embed records that lack an embedding with `embedder`
    pub fn with_embedder(mut self, embedder: &'a dyn EmbeddingProvider) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Clear the store before loading
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Records per embedding call (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Load a JSON file
    pub async fn load_file(&self, path: &Path) -> Result<IndexStats> {
        self.load_file_with_progress(path, &mut NoopProgress).await
    }

    /// Load a JSON file with progress reporting
    pub async fn load_file_with_progress(
        &self,
        path: &Path,
        progress: &mut dyn IndexProgress,
    ) -> Result<IndexStats> {
        tracing::info!("Loading chunks from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        let Value::Array(records) = value else {
            return Err(Error::InvalidRecord(format!(
                "{} must contain a JSON array of chunks",
                path.display()
            )));
        };
        self.load_records(records, progress).await
    }

    /// Load already-parsed records
    pub async fn load_records(
        &self,
        records: Vec<Value>,
        progress: &mut dyn IndexProgress,
    ) -> Result<IndexStats> {
        let start = Instant::now();
        let mut stats = IndexStats {
            records_read: records.len(),
            ..Default::default()
        };

        if self.reset {
            self.store.clear()?;
        }

        for (batch_no, batch) in records.chunks(self.batch_size).enumerate() {
            tracing::debug!("Processing batch {} ({} records)", batch_no + 1, batch.len());
            self.load_batch(batch, batch_no * self.batch_size, &mut stats, progress)
                .await;
        }

        self.store.mark_indexed()?;

        stats.duration = start.elapsed();
        tracing::info!(
            read = stats.records_read,
            indexed = stats.records_indexed,
            embedded = stats.records_embedded,
            errors = stats.errors,
            "Load complete in {:?}",
            stats.duration
        );
        progress.on_complete(&stats);

        Ok(stats)
    }

    async fn load_batch(
        &self,
        batch: &[Value],
        first: usize,
        stats: &mut IndexStats,
        progress: &mut dyn IndexProgress,
    ) {
        let mut parsed = Vec::with_capacity(batch.len());
        for (offset, value) in batch.iter().enumerate() {
            let label = record_label(value, first + offset);
            match serde_json::from_value::<RawChunk>(value.clone())
                .map_err(Error::from)
                .and_then(RawChunk::into_record)
            {
                Ok(record) => parsed.push(record),
                Err(e) => fail(stats, progress, &label, e),
            }
        }

        let missing: Vec<String> = parsed
            .iter()
            .filter(|(_, embedding)| embedding.is_none())
            .map(|(record, _)| record.text.clone())
            .collect();

        let mut generated = match (missing.is_empty(), self.embedder) {
            (true, _) => Ok(Vec::new()),
            (false, None) => Err(Error::EmbeddingError(
                "record has no embedding and no provider is configured".into(),
            )),
            (false, Some(embedder)) => match embedder.embed_batch(&missing).await {
                Ok(vectors) if vectors.len() == missing.len() => Ok(vectors),
                Ok(vectors) => Err(Error::EmbeddingError(format!(
                    "provider returned {} embeddings for {} texts",
                    vectors.len(),
                    missing.len()
                ))),
                Err(e) => Err(e),
            },
        }
        .map(|vectors| vectors.into_iter());

        let provider_model = self
            .embedder
            .map(|e| e.model_name().to_string())
            .unwrap_or_else(|| EXTERNAL_MODEL.to_string());

        for (record, embedding) in parsed {
            let (vector, model, status) = match embedding {
                Some(vector) => (vector, EXTERNAL_MODEL, RecordStatus::Indexed),
                None => match generated.as_mut() {
                    Ok(vectors) => match vectors.next() {
                        Some(vector) => (vector, provider_model.as_str(), RecordStatus::Embedded),
                        None => {
                            fail(stats, progress, &record.id, Error::EmbeddingError(
                                "missing embedding in provider response".into(),
                            ));
                            continue;
                        }
                    },
                    Err(e) => {
                        fail(stats, progress, &record.id, Error::EmbeddingError(e.to_string()));
                        continue;
                    }
                },
            };

            match self.store.upsert_chunk(&record, model, &vector) {
                Ok(()) => {
                    stats.records_indexed += 1;
                    if status == RecordStatus::Embedded {
                        stats.records_embedded += 1;
                    }
                    progress.on_record(&record.id, status);
                }
                Err(e) => fail(stats, progress, &record.id, e),
            }
        }
    }
}

fn fail(stats: &mut IndexStats, progress: &mut dyn IndexProgress, id: &str, err: Error) {
    tracing::warn!("Skipping record {}: {}", id, err);
    stats.errors += 1;
    progress.on_record(id, RecordStatus::Error(err.to_string()));
}

fn record_label(value: &Value, position: usize) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("<record {}>", position))
}
