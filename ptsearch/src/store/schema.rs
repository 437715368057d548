//! Database schema for the ptsearch vector store

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

/// SQL to create the database schema
const SCHEMA_SQL: &str = r#"
-- Pre-chunked documentation records with their embeddings
CREATE TABLE IF NOT EXISTS chunks (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    title TEXT,
    source TEXT NOT NULL,
    text TEXT NOT NULL,
    chunk_type TEXT NOT NULL CHECK (chunk_type IN ('code', 'text')),
    language TEXT,
    model TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_type ON chunks(chunk_type);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);

-- Index state (schema version, last load time)
CREATE TABLE IF NOT EXISTS index_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Ensure the database schema is up to date
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_state'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        conn.execute_batch(SCHEMA_SQL)?;

        conn.execute(
            "INSERT INTO index_state (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;

        tracing::info!("Created database schema version {}", SCHEMA_VERSION);
    } else {
        let version: i64 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM index_state WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            migrate(conn, version)?;
        }
    }

    Ok(())
}

/// Migrate from an older schema version
fn migrate(conn: &Connection, from_version: i64) -> Result<()> {
    tracing::info!(
        "Migrating database from version {} to {}",
        from_version,
        SCHEMA_VERSION
    );

    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR REPLACE INTO index_state (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
