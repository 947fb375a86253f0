//! Prometheus metrics for ingestion, the snapshot store, queries and the
//! query cache.
//!
//! Recording goes through the `metrics` facade, so every helper is a no-op
//! until [`init`] installs the recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// All metric names used in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingestion
    IngestRunsSuccess,
    IngestRunsError,
    IngestRowsRead,
    IngestRowsLoaded,
    IngestRowsRejected,
    IngestSentinelCells,
    IngestCoercedCells,
    IngestDuration,

    // Snapshot store
    StoreSnapshotVersion,
    StoreRecords,

    // Queries
    QueryRequests,
    QueryErrors,
    QueryDuration,

    // Query cache
    CacheHits,
    CacheMisses,
    CacheInvalidations,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestRunsSuccess => "igs_ingest_runs_success_total",
            MetricName::IngestRunsError => "igs_ingest_runs_error_total",
            MetricName::IngestRowsRead => "igs_ingest_rows_read_total",
            MetricName::IngestRowsLoaded => "igs_ingest_rows_loaded_total",
            MetricName::IngestRowsRejected => "igs_ingest_rows_rejected_total",
            MetricName::IngestSentinelCells => "igs_ingest_sentinel_cells_total",
            MetricName::IngestCoercedCells => "igs_ingest_coerced_cells_total",
            MetricName::IngestDuration => "igs_ingest_duration_seconds",

            MetricName::StoreSnapshotVersion => "igs_store_snapshot_version",
            MetricName::StoreRecords => "igs_store_records",

            MetricName::QueryRequests => "igs_query_requests_total",
            MetricName::QueryErrors => "igs_query_errors_total",
            MetricName::QueryDuration => "igs_query_duration_seconds",

            MetricName::CacheHits => "igs_cache_hits_total",
            MetricName::CacheMisses => "igs_cache_misses_total",
            MetricName::CacheInvalidations => "igs_cache_invalidations_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            IngestRunsSuccess,
            IngestRunsError,
            IngestRowsRead,
            IngestRowsLoaded,
            IngestRowsRejected,
            IngestSentinelCells,
            IngestCoercedCells,
            IngestDuration,
            StoreSnapshotVersion,
            StoreRecords,
            QueryRequests,
            QueryErrors,
            QueryDuration,
            CacheHits,
            CacheMisses,
            CacheInvalidations,
        ]
        .into_iter()
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once; only the
/// first call installs.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    if METRICS_HANDLE.set(handle).is_err() {
        warn!("Prometheus recorder was installed concurrently");
    }
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus text exposition, `None` before [`init`]
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub mod ingest {
    use super::MetricName;
    use crate::pipeline::report::LoadReport;

    pub fn run_success(report: &LoadReport) {
        ::metrics::counter!(MetricName::IngestRunsSuccess.as_str()).increment(1);
        ::metrics::counter!(MetricName::IngestRowsRead.as_str()).increment(report.rows_read as u64);
        ::metrics::counter!(MetricName::IngestRowsLoaded.as_str()).increment(report.rows_loaded as u64);
        ::metrics::counter!(MetricName::IngestRowsRejected.as_str()).increment(report.rows_rejected as u64);
        ::metrics::counter!(MetricName::IngestSentinelCells.as_str()).increment(report.sentinel_cells as u64);
        ::metrics::counter!(MetricName::IngestCoercedCells.as_str()).increment(report.coerced_cells as u64);
    }

    pub fn run_error(error_code: &'static str) {
        ::metrics::counter!(MetricName::IngestRunsError.as_str(), "error_code" => error_code).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::IngestDuration.as_str()).record(secs);
    }
}

pub mod store {
    use super::MetricName;

    pub fn snapshot_installed(version: u64, records: usize) {
        ::metrics::gauge!(MetricName::StoreSnapshotVersion.as_str()).set(version as f64);
        ::metrics::gauge!(MetricName::StoreRecords.as_str()).set(records as f64);
    }
}

pub mod query {
    use super::MetricName;

    pub fn request(operation: &'static str) {
        ::metrics::counter!(MetricName::QueryRequests.as_str(), "operation" => operation).increment(1);
    }

    pub fn error(operation: &'static str, error_code: &'static str) {
        ::metrics::counter!(
            MetricName::QueryErrors.as_str(),
            "operation" => operation,
            "error_code" => error_code
        )
        .increment(1);
    }

    pub fn duration(operation: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::QueryDuration.as_str(), "operation" => operation).record(secs);
    }
}

pub mod cache {
    use super::MetricName;

    pub fn hit() {
        ::metrics::counter!(MetricName::CacheHits.as_str()).increment(1);
    }

    pub fn miss() {
        ::metrics::counter!(MetricName::CacheMisses.as_str()).increment(1);
    }

    pub fn invalidated() {
        ::metrics::counter!(MetricName::CacheInvalidations.as_str()).increment(1);
    }
}
