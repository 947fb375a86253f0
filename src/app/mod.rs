pub mod ingest_use_case;

use std::sync::Arc;

use crate::analytics::{AnalyticsEngine, QueryCache};
use crate::common::error::Result;
use crate::config::AppConfig;
use crate::pipeline::storage::{SnapshotStore, SqliteRepository, TractRepository};

pub use ingest_use_case::IngestUseCase;

/// The engine and the ingestion use case wired to one shared snapshot store
/// and query cache
#[derive(Clone)]
pub struct AppServices {
    pub engine: Arc<AnalyticsEngine>,
    pub ingest: Arc<IngestUseCase>,
}

impl AppServices {
    pub fn build(config: &AppConfig, repository: Arc<dyn TractRepository>) -> Self {
        let store = Arc::new(SnapshotStore::new());
        let cache = Arc::new(QueryCache::new(config.cache.enabled, config.cache.capacity));
        let engine = Arc::new(AnalyticsEngine::new(Arc::clone(&store), Arc::clone(&cache)));
        let ingest = Arc::new(IngestUseCase::new(&config.ingest, repository, store, cache));
        Self { engine, ingest }
    }

    /// Services backed by the configured SQLite database
    pub fn open(config: &AppConfig) -> Result<Self> {
        let repository = SqliteRepository::open(&config.storage.database_path)?;
        Ok(Self::build(config, Arc::new(repository)))
    }
}
