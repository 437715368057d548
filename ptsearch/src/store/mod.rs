//! Vector store for ptsearch
//!
//! The store manages the SQLite database containing:
//! - Chunks (pre-chunked documentation records)
//! - Embeddings (one little-endian `f32` blob per chunk)
//! - Index state (schema version, last load time)
//!
//! Nearest-neighbour lookup is an exhaustive cosine scan, which is plenty for
//! a documentation corpus of a few tens of thousands of chunks.

mod schema;

use crate::error::{Error, Result};
use crate::search::{Candidate, ContentKind};
use crate::upstream::VectorStore;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use schema::SCHEMA_VERSION;

/// A chunk as stored, without its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique chunk identifier
    pub id: String,
    /// Section or file title
    pub title: Option<String>,
    /// URI or path of the source document
    pub source: String,
    /// Chunk text
    pub text: String,
    /// Code or prose
    pub kind: ContentKind,
    /// Programming language for code chunks
    pub language: Option<String>,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// All chunks
    pub total_chunks: i64,
    /// Chunks of kind `code`
    pub code_chunks: i64,
    /// Chunks of kind `text`
    pub text_chunks: i64,
    /// Distinct embedding models present
    pub models: Vec<String>,
    /// Database size in bytes (0 for in-memory stores)
    pub database_size_bytes: u64,
    /// RFC 3339 time of the last load, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<String>,
}

/// The main database store
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Store { conn, path };
        schema::ensure_schema(&store.conn)?;

        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Store {
            conn,
            path: PathBuf::from(":memory:"),
        };
        schema::ensure_schema(&store.conn)?;
        Ok(store)
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -------------------------------------------------------------------------
    // Chunk operations
    // -------------------------------------------------------------------------

    /// Insert or replace a chunk and its embedding
    pub fn upsert_chunk(&self, record: &ChunkRecord, model: &str, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "chunk {} has an empty embedding",
                record.id
            )));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO chunks (id, title, source, text, chunk_type, language, model, dimensions, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               source = excluded.source,
               text = excluded.text,
               chunk_type = excluded.chunk_type,
               language = excluded.language,
               model = excluded.model,
               dimensions = excluded.dimensions,
               embedding = excluded.embedding",
            params![
                record.id,
                record.title,
                record.source,
                record.text,
                record.kind.as_str(),
                record.language,
                model,
                embedding.len() as i64,
                embedding_to_bytes(embedding),
                now
            ],
        )?;

        Ok(())
    }

    /// Get a chunk by id
    pub fn get_chunk(&self, id: &str) -> Result<Option<ChunkRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, title, source, text, chunk_type, language FROM chunks WHERE id = ?1",
                [id],
                |row| {
                    let kind: String = row.get(4)?;
                    Ok((
                        ChunkRecord {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            source: row.get(2)?,
                            text: row.get(3)?,
                            kind: ContentKind::Text,
                            language: row.get(5)?,
                        },
                        kind,
                    ))
                },
            )
            .optional()?;

        record
            .map(|(mut record, kind)| {
                record.kind = kind.parse()?;
                Ok(record)
            })
            .transpose()
    }

    /// Delete every chunk, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM chunks", [])?;
        tracing::info!("Cleared {} chunks from store", removed);
        Ok(removed)
    }

    /// Count chunks, optionally of one kind
    pub fn count_chunks(&self, kind: Option<ContentKind>) -> Result<i64> {
        let count: i64 = match kind {
            Some(kind) => self.conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE chunk_type = ?1",
                [kind.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// The `k` chunks most similar to `vector`, highest similarity first.
    ///
    /// Chunks whose embedding width differs from the query are skipped.
    /// Equal similarities keep insertion order.
    pub fn nearest(
        &self,
        vector: &[f32],
        k: usize,
        kind: Option<ContentKind>,
    ) -> Result<Vec<Candidate>> {
        if k == 0 || vector.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, title, source, text, chunk_type, language, embedding
             FROM chunks
             WHERE dimensions = ?1 AND (?2 IS NULL OR chunk_type = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(
            params![vector.len() as i64, kind.map(|k| k.as_str())],
            |row| {
                let chunk_type: String = row.get(4)?;
                let blob: Vec<u8> = row.get(6)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    chunk_type,
                    row.get::<_, Option<String>>(5)?,
                    blob,
                ))
            },
        )?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, title, source, text, chunk_type, language, blob) = row?;
            let score = cosine_similarity(vector, &bytes_to_embedding(&blob)) as f64;
            scored.push(Candidate {
                id,
                title,
                source,
                text,
                kind: chunk_type.parse()?,
                language,
                score,
            });
        }

        // stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    // -------------------------------------------------------------------------
    // Index state
    // -------------------------------------------------------------------------

    /// Record that a load finished now
    pub fn mark_indexed(&self) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO index_state (key, value) VALUES ('last_indexed_at', ?1)",
            [Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Summary statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let models = self
            .conn
            .prepare("SELECT DISTINCT model FROM chunks ORDER BY model")?
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        let last_indexed_at = self
            .conn
            .query_row(
                "SELECT value FROM index_state WHERE key = 'last_indexed_at'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(StoreStats {
            total_chunks: self.count_chunks(None)?,
            code_chunks: self.count_chunks(Some(ContentKind::Code))?,
            text_chunks: self.count_chunks(Some(ContentKind::Text))?,
            models,
            database_size_bytes: self.database_size()?,
            last_indexed_at,
        })
    }

    /// Get database file size in bytes
    pub fn database_size(&self) -> Result<u64> {
        if self.path.to_str() == Some(":memory:") {
            return Ok(0);
        }
        let metadata = std::fs::metadata(&self.path)?;
        Ok(metadata.len())
    }
}

/// A [`Store`] shared between sessions.
///
/// Queries run on the blocking thread pool so a long scan never stalls the
/// async runtime.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    /// Wrap a store for concurrent use
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run a closure against the store on the blocking pool
    pub async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let store = inner
                .lock()
                .map_err(|_| Error::StoreError("store lock poisoned".to_string()))?;
            f(&store)
        })
        .await
        .map_err(|e| Error::StoreError(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl VectorStore for SharedStore {
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        kind: Option<ContentKind>,
    ) -> Result<Vec<Candidate>> {
        let vector = vector.to_vec();
        self.with_store(move |store| store.nearest(&vector, k, kind))
            .await
            .map_err(|e| {
                if e.is_upstream() {
                    e
                } else {
                    Error::StoreError(e.to_string())
                }
            })
    }
}

/// Serialize embedding to bytes for SQLite storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from bytes; a trailing partial value is ignored
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
