//! Ingest pipeline: source tree in, committed index out.
//!
//! A run loads the source tree, chunks every document, embeds the chunks in
//! batches, and writes a complete fresh index that replaces the previous one
//! atomically on commit. A failed run abandons its temp database and leaves
//! any previously committed index exactly as it was.
//!
//! Concurrent ingests against the same index path are refused: a lock file
//! beside the index (`<path>.lock`) is created exclusively for the duration
//! of a run.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::loader::load_documents;
use crate::store::IndexBuilder;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source root is not a readable directory: {0}")]
    UnreadableRoot(String),

    #[error("no ingestible documents under {0}")]
    NoDocuments(String),

    #[error("another ingest is already running against {0}")]
    Locked(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a completed run produced.
#[derive(Debug)]
pub struct IngestReport {
    pub document_count: usize,
    pub chunk_count: usize,
    /// Files that were skipped, with reasons. Non-fatal.
    pub errors: Vec<String>,
}

/// Exclusive lock-file guard; released on drop.
struct IngestLock {
    path: PathBuf,
}

impl IngestLock {
    fn acquire(index_path: &Path) -> Result<Self, IngestError> {
        let path = PathBuf::from(format!("{}.lock", index_path.display()));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IngestError::Other(e.into()))?;
            }
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(IngestError::Locked(index_path.display().to_string()))
            }
            Err(e) => Err(IngestError::Other(e.into())),
        }
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Run a full ingest per the configuration. The returned report reflects
/// the newly committed index.
pub async fn run_ingest(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
) -> Result<IngestReport, IngestError> {
    let root = &config.ingest.root;
    if !root.is_dir() {
        return Err(IngestError::UnreadableRoot(root.display().to_string()));
    }

    let _lock = IngestLock::acquire(&config.index.path)?;

    info!(root = %root.display(), "scanning source tree");
    let outcome = load_documents(root, &config.ingest)?;
    for err in &outcome.errors {
        warn!(error = %err, "skipped during load");
    }
    if outcome.documents.is_empty() {
        // Refused before any temp database exists, so a previously
        // committed index survives untouched.
        return Err(IngestError::NoDocuments(root.display().to_string()));
    }

    info!(
        documents = outcome.documents.len(),
        "chunking and embedding"
    );
    let builder = IndexBuilder::create(&config.index.path).await?;

    let result = build_index(config, embedder, &outcome.documents, &builder).await;
    match result {
        Ok(chunk_count) => {
            builder.commit().await?;

            info!(
                documents = outcome.documents.len(),
                chunks = chunk_count,
                index = %config.index.path.display(),
                "index committed"
            );
            Ok(IngestReport {
                document_count: outcome.documents.len(),
                chunk_count,
                errors: outcome.errors,
            })
        }
        Err(e) => {
            builder.abandon().await;
            Err(e)
        }
    }
}

async fn build_index(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    documents: &[crate::loader::Document],
    builder: &IndexBuilder,
) -> Result<usize, IngestError> {
    builder.put_meta("model", embedder.model_name()).await?;
    builder.put_meta("dims", &embedder.dims().to_string()).await?;
    builder
        .put_meta("chunk_size", &config.chunking.chunk_size.to_string())
        .await?;
    builder
        .put_meta("overlap", &config.chunking.overlap.to_string())
        .await?;
    builder
        .put_meta("created_at", &chrono::Utc::now().to_rfc3339())
        .await?;

    let batch_size = config.embedding.batch_size.max(1);
    let mut chunk_count = 0usize;

    for doc in documents {
        let chunks = chunk_document(
            &doc.path,
            &doc.text,
            config.chunking.chunk_size,
            config.chunking.overlap,
        );
        if chunks.is_empty() {
            continue;
        }

        let doc_id = builder.insert_document(&doc.path, &doc.kind).await?;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }
            for (chunk, vector) in batch.iter().zip(&vectors) {
                builder.insert_chunk(doc_id, chunk, vector).await?;
                chunk_count += 1;
            }
        }
    }

    Ok(chunk_count)
}
