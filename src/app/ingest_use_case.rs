use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::analytics::QueryCache;
use crate::common::error::Result;
use crate::config::IngestConfig;
use crate::observability::metrics::{ingest as ingest_metrics, store as store_metrics};
use crate::pipeline::loader::IngestionPipeline;
use crate::pipeline::report::LoadReport;
use crate::pipeline::storage::{SnapshotStore, TractRepository};

/// Load-then-swap ingestion.
///
/// The new record set is fully built and persisted before the in-memory
/// snapshot is replaced. Any failure leaves both the repository and the
/// snapshot as they were. Runs are serialized.
pub struct IngestUseCase {
    pipeline: IngestionPipeline,
    repository: Arc<dyn TractRepository>,
    store: Arc<SnapshotStore>,
    cache: Arc<QueryCache>,
    report_path: Option<PathBuf>,
    running: Mutex<()>,
}

impl IngestUseCase {
    pub fn new(
        config: &IngestConfig,
        repository: Arc<dyn TractRepository>,
        store: Arc<SnapshotStore>,
        cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            pipeline: IngestionPipeline::new(config),
            repository,
            store,
            cache,
            report_path: config.report_path.clone(),
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub async fn ingest_path(&self, path: &Path) -> Result<LoadReport> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read source {}: {}", path.display(), e);
                ingest_metrics::run_error("IO");
                return Err(e.into());
            }
        };
        self.ingest_bytes(&bytes, Some(&path.display().to_string()))
            .await
    }

    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn ingest_bytes(&self, bytes: &[u8], source_path: Option<&str>) -> Result<LoadReport> {
        let _running = self.running.lock().await;
        let started = Instant::now();

        match self.load(bytes, source_path).await {
            Ok(report) => {
                ingest_metrics::run_success(&report);
                ingest_metrics::duration(started.elapsed().as_secs_f64());
                Ok(report)
            }
            Err(e) => {
                error!("Ingestion failed, previous store kept: {}", e);
                ingest_metrics::run_error(e.code());
                Err(e)
            }
        }
    }

    async fn load(&self, bytes: &[u8], source_path: Option<&str>) -> Result<LoadReport> {
        let prepared = self.pipeline.prepare(bytes, source_path)?;
        let mut report = prepared.report;
        let records = prepared.records;

        // Only this use case installs while `running` is held
        report.load_version = Some(self.store.version() + 1);
        self.repository.replace_all(&records, &report).await?;

        let record_count = records.len();
        let version = self
            .store
            .install(records, Some(report.source_sha256.clone()));
        report.load_version = Some(version);
        self.cache.invalidate();
        store_metrics::snapshot_installed(version, record_count);

        info!(
            "Ingestion run {} installed version {} ({} records, {} rows rejected)",
            report.run_id, version, record_count, report.rows_rejected
        );

        if let Some(path) = &self.report_path {
            if let Err(e) = write_report(path, &report).await {
                warn!("Could not write load report to {}: {}", path.display(), e);
            }
        }
        Ok(report)
    }

    /// Report of the most recent successful load, if any
    pub async fn last_report(&self) -> Result<Option<LoadReport>> {
        self.repository.last_load().await
    }

    /// Rebuild the in-memory snapshot from the repository, e.g. at startup.
    /// The persisted load version carries over. Returns the installed version.
    pub async fn restore_snapshot(&self) -> Result<u64> {
        let _running = self.running.lock().await;
        let records = self.repository.load_all().await?;
        let last = self.repository.last_load().await?;
        let persisted_version = last.as_ref().and_then(|r| r.load_version).unwrap_or(0);
        let sha = last.map(|r| r.source_sha256);
        let count = records.len();
        let version = self.store.install_at_least(records, sha, persisted_version);
        self.cache.invalidate();
        store_metrics::snapshot_installed(version, count);
        info!("Restored {} records from the repository as version {}", count, version);
        Ok(version)
    }
}

async fn write_report(path: &Path, report: &LoadReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, serde_json::to_vec_pretty(report)?).await?;
    Ok(())
}
