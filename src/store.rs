//! Persisted index: vector store + lexical store in one SQLite file.
//!
//! The index is written as a single unit and replaced wholesale: an
//! [`IndexBuilder`] writes a complete database at `<path>.tmp-<uuid>` and
//! [`IndexBuilder::commit`] renames it over the final path. The rename is the
//! atomic swap — readers holding an open [`IndexStore`] keep their snapshot,
//! and new readers see either the old index or the new one, never a mix.
//!
//! Chunk ids are SQLite rowids assigned in insertion order, which makes them
//! unique within a run and usable as the final deterministic tie-break in
//! retrieval.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::chunk::Chunk;
use crate::embedding::{blob_to_vec, vec_to_blob};

/// The persisted index is missing or unusable. Surfaced to the caller
/// directly — there is no fallback index.
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("index not found at {0} — run ingest first")]
    Missing(String),

    #[error("index at {0} is corrupt or incompatible: {1}")]
    Corrupt(String, String),
}

/// A stored chunk row joined with its document path.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub document_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub token_count: i64,
}

/// Lower-cased alphanumeric tokens — the unit of the lexical store.
/// Shared by indexing, lexical search, and the hash embedder.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create);

    // Exactly one connection, opened eagerly and never recycled: the handle
    // stays bound to the file it opened, so a rename swapping a new index
    // into place cannot split one query sequence across two snapshots.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

// ============ Read side ============

/// Read-only handle to a committed index snapshot.
pub struct IndexStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl IndexStore {
    /// Open an existing index. Fails with [`IndexLoadError`] when the file
    /// is missing or its `meta` table cannot be read.
    pub async fn open(path: &Path) -> Result<Self, IndexLoadError> {
        if !path.is_file() {
            return Err(IndexLoadError::Missing(path.display().to_string()));
        }

        let pool = connect(path, false)
            .await
            .map_err(|e| IndexLoadError::Corrupt(path.display().to_string(), e.to_string()))?;

        // A readable meta table is the integrity marker for a committed index
        let check: Result<i64, sqlx::Error> = sqlx::query_scalar("SELECT COUNT(*) FROM meta")
            .fetch_one(&pool)
            .await;
        if let Err(e) = check {
            pool.close().await;
            return Err(IndexLoadError::Corrupt(
                path.display().to_string(),
                e.to_string(),
            ));
        }

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn document_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn chunk_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?)
    }

    /// All stored embeddings, ordered by chunk id. The vector channel scans
    /// these and scores them in Rust.
    pub async fn all_vectors(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows = sqlx::query("SELECT chunk_id, embedding FROM chunk_vectors ORDER BY chunk_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("chunk_id");
                let blob: Vec<u8> = row.get("embedding");
                (id, blob_to_vec(&blob))
            })
            .collect())
    }

    /// Summed term frequency and chunk length for every chunk matching any
    /// of the given terms: `(chunk_id, total_freq, token_count)`.
    pub async fn term_postings(&self, terms: &[String]) -> Result<Vec<(i64, i64, i64)>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; terms.len()].join(", ");
        let sql = format!(
            "SELECT t.chunk_id, SUM(t.freq) AS total_freq, c.token_count \
             FROM chunk_terms t JOIN chunks c ON c.id = t.chunk_id \
             WHERE t.term IN ({}) \
             GROUP BY t.chunk_id \
             ORDER BY t.chunk_id",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for term in terms {
            query = query.bind(term);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("chunk_id"),
                    row.get::<i64, _>("total_freq"),
                    row.get::<i64, _>("token_count"),
                )
            })
            .collect())
    }

    /// Fetch chunk rows for the given ids, keyed by id.
    pub async fn chunks_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, ChunkRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT c.id, d.path AS document_path, c.chunk_index, c.text, c.token_count \
             FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE c.id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let record = ChunkRecord {
                    id: row.get("id"),
                    document_path: row.get("document_path"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    token_count: row.get("token_count"),
                };
                (record.id, record)
            })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

// ============ Write side ============

/// Builds a fresh index at a temporary path; [`commit`](Self::commit) swaps
/// it over the final path atomically. Never mutates a committed index.
pub struct IndexBuilder {
    pool: SqlitePool,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl IndexBuilder {
    pub async fn create(final_path: &Path) -> Result<Self> {
        let temp_path = PathBuf::from(format!(
            "{}.tmp-{}",
            final_path.display(),
            Uuid::new_v4()
        ));

        let pool = connect(&temp_path, true).await?;
        create_schema(&pool).await?;

        Ok(Self {
            pool,
            temp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    pub async fn put_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_document(&self, path: &str, kind: &str) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("INSERT INTO documents (path, kind, ingested_at) VALUES (?, ?, ?)")
            .bind(path)
            .bind(kind)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert one chunk with its embedding and derived lexical statistics.
    /// Returns the chunk id (insertion-ordered rowid).
    pub async fn insert_chunk(
        &self,
        document_id: i64,
        chunk: &Chunk,
        embedding: &[f32],
    ) -> Result<i64> {
        let tokens = tokenize(&chunk.text);
        let token_count = tokens.len() as i64;

        let mut freqs: HashMap<String, i64> = HashMap::new();
        for token in tokens {
            *freqs.entry(token).or_insert(0) += 1;
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO chunks (document_id, chunk_index, text, hash, token_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(token_count)
        .execute(&mut *tx)
        .await?;
        let chunk_id = result.last_insert_rowid();

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
            .bind(chunk_id)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;

        for (term, freq) in &freqs {
            sqlx::query("INSERT INTO chunk_terms (term, chunk_id, freq) VALUES (?, ?, ?)")
                .bind(term)
                .bind(chunk_id)
                .bind(freq)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(chunk_id)
    }

    /// Close the temp database and rename it over the final path.
    pub async fn commit(self) -> Result<()> {
        self.pool.close().await;
        std::fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }

    /// Discard the partially built index, leaving any committed one intact.
    pub async fn abandon(self) {
        self.pool.close().await;
        let _ = std::fs::remove_file(&self.temp_path);
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE documents (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunks (
            id INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunk_vectors (
            chunk_id INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE chunk_terms (
            term TEXT NOT NULL,
            chunk_id INTEGER NOT NULL,
            freq INTEGER NOT NULL,
            PRIMARY KEY (term, chunk_id),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX idx_chunk_terms_term ON chunk_terms(term)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}
