//! Application context: configuration plus the shared provider handles.
//!
//! All state flows through an explicit [`AppContext`] value — there are no
//! globals. Callers construct one from a loaded [`Config`] and pass it (or
//! the pieces it hands out) to the operations they run.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embedding::{create_embedding_provider, EmbeddingProvider};
use crate::generate::{create_generator, Generator};
use crate::ingest::{run_ingest, IngestError, IngestReport};
use crate::locate::{enumerate_elements, locate, ElementSummary, LocateResponse, LocatorOptions};
use crate::retrieve::{retrieve, RetrievalError, RetrievalOptions, RetrievalResult};
use crate::session::{Role, Session};
use crate::store::{IndexLoadError, IndexStore};

pub struct AppContext {
    pub config: Config,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn Generator>,
    /// Serializes ingest runs within this process; the index lock file
    /// covers other processes.
    ingest_lock: Mutex<()>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let embedder = create_embedding_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self {
            config,
            embedder,
            generator,
            ingest_lock: Mutex::new(()),
        })
    }

    pub async fn ingest(&self) -> Result<IngestReport, IngestError> {
        let _guard = self.ingest_lock.lock().await;
        run_ingest(&self.config, self.embedder.as_ref()).await
    }

    /// Open the current committed index snapshot.
    pub async fn open_index(&self) -> Result<IndexStore, IndexLoadError> {
        IndexStore::open(&self.config.index.path).await
    }

    pub async fn retrieve(
        &self,
        store: &IndexStore,
        query: &str,
        opts: &RetrievalOptions,
    ) -> Result<Vec<RetrievalResult>, RetrievalError> {
        retrieve(store, self.embedder.as_ref(), query, opts).await
    }

    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions::from(&self.config.retrieval)
    }

    pub fn session(&self, role: Role) -> Session {
        Session::new(role, self.config.session.history_cap)
    }

    pub async fn locate(&self, url: &str, descriptor: &str) -> LocateResponse {
        locate(url, descriptor, &LocatorOptions::from(&self.config.locator)).await
    }

    pub async fn enumerate_elements(&self, url: &str) -> Result<Vec<ElementSummary>, String> {
        enumerate_elements(url, &LocatorOptions::from(&self.config.locator)).await
    }
}
