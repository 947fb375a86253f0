use anyhow::Result;
use igs_analytics::common::error::{IgsError, RejectionReason};
use igs_analytics::config::AppConfig;
use igs_analytics::pipeline::storage::{InMemoryRepository, SqliteRepository, TractRepository};
use igs_analytics::AppServices;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/resources/sample_igs.csv")
}

fn in_memory_services() -> AppServices {
    AppServices::build(&AppConfig::default(), Arc::new(InMemoryRepository::new()))
}

#[tokio::test]
async fn sample_source_report_counts() -> Result<()> {
    let services = in_memory_services();
    let report = services.ingest.ingest_path(&sample_path()).await?;

    assert_eq!(report.header_row, 2);
    assert_eq!(report.header_rows_skipped, 1);
    assert_eq!(report.blank_rows_skipped, 1);
    assert_eq!(report.rows_read, 8);
    assert_eq!(report.rows_loaded, 7);
    assert_eq!(report.rows_rejected, 1);
    assert_eq!(report.rows_loaded + report.rows_rejected, report.rows_read);
    assert_eq!(report.records_stored, 7);
    assert_eq!(report.rejection_summary.get("malformed_tract_id"), Some(&1));
    assert!(matches!(
        &report.rejection_reasons[0].reason,
        RejectionReason::MalformedTractId { value } if value == "4845300"
    ));
    assert_eq!(report.load_version, Some(1));
    assert_eq!(report.source_sha256.len(), 64);
    Ok(())
}

#[tokio::test]
async fn sentinel_cells_stay_absent() -> Result<()> {
    let services = in_memory_services();
    let report = services.ingest.ingest_path(&sample_path()).await?;
    assert_eq!(report.sentinel_cells, 3);

    let records = services.engine.lookup("13089021416", Some(2020))?;
    let record = &records[0];
    assert_eq!(record.metric("minority_women_owned_businesses_score"), None);
    assert!(record
        .metrics
        .contains_key("minority_women_owned_businesses_score"));
    assert_eq!(record.metric("internet_access_score"), Some(70.0));
    assert_eq!(record.metric("net_occupancy_base_pct"), Some(88.0));
    Ok(())
}

#[tokio::test]
async fn reload_of_same_source_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let repo = Arc::new(SqliteRepository::open(dir.path().join("igs.db"))?);
    let services = AppServices::build(&AppConfig::default(), repo.clone());

    services.ingest.ingest_path(&sample_path()).await?;
    let first = repo.load_all().await?;
    let second_report = services.ingest.ingest_path(&sample_path()).await?;
    let second = repo.load_all().await?;

    assert_eq!(first, second);
    assert_eq!(repo.count().await?, 7);
    assert_eq!(second_report.load_version, Some(2));
    assert_eq!(services.engine.status().record_count, 7);
    Ok(())
}

#[tokio::test]
async fn failed_load_leaves_database_and_snapshot_untouched() -> Result<()> {
    let dir = tempdir()?;
    let repo = Arc::new(SqliteRepository::open(dir.path().join("igs.db"))?);
    let services = AppServices::build(&AppConfig::default(), repo.clone());
    services.ingest.ingest_path(&sample_path()).await?;

    let bad = dir.path().join("bad.csv");
    std::fs::write(&bad, "not,a,tract,table\n1,2,3,4\n")?;
    let err = services.ingest.ingest_path(&bad).await.unwrap_err();
    assert!(matches!(err, IgsError::MalformedSource { .. }));

    assert_eq!(repo.count().await?, 7);
    let last = repo.last_load().await?.unwrap();
    assert_eq!(last.load_version, Some(1));
    assert_eq!(services.engine.status().version, 1);
    assert_eq!(services.engine.status().record_count, 7);
    Ok(())
}

#[tokio::test]
async fn header_only_source_keeps_previous_load() -> Result<()> {
    let dir = tempdir()?;
    let repo = Arc::new(SqliteRepository::open(dir.path().join("igs.db"))?);
    let services = AppServices::build(&AppConfig::default(), repo.clone());
    services.ingest.ingest_path(&sample_path()).await?;
    let before = repo.load_all().await?;

    let err = services
        .ingest
        .ingest_bytes(b"tract_id,year,county,state,growth\n", Some("header_only.csv"))
        .await
        .unwrap_err();
    match err {
        IgsError::MalformedSource { row, byte_offset, .. } => {
            assert_eq!(row, 1);
            assert_eq!(byte_offset, 34);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(repo.load_all().await?, before);
    assert_eq!(repo.last_load().await?.unwrap().load_version, Some(1));
    assert_eq!(services.engine.status().version, 1);
    assert_eq!(services.engine.status().record_count, 7);
    Ok(())
}

#[tokio::test]
async fn missing_source_file_is_an_io_error() {
    let services = in_memory_services();
    let err = services
        .ingest
        .ingest_path(&PathBuf::from("/nonexistent/igs.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, IgsError::Io(_)));
    assert_eq!(services.engine.status().version, 0);
}

#[tokio::test]
async fn snapshot_restores_from_sqlite() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("igs.db");
    {
        let repo = Arc::new(SqliteRepository::open(&db)?);
        let services = AppServices::build(&AppConfig::default(), repo);
        services.ingest.ingest_path(&sample_path()).await?;
    }

    let repo = Arc::new(SqliteRepository::open(&db)?);
    let services = AppServices::build(&AppConfig::default(), repo);
    services.ingest.restore_snapshot().await?;

    let status = services.engine.status();
    assert_eq!(status.version, 1);
    assert_eq!(status.record_count, 7);
    assert_eq!(status.tract_count, 6);
    assert_eq!(status.states, vec!["Georgia".to_string(), "Texas".to_string()]);
    assert_eq!(status.years, vec![2019, 2020]);
    assert!(status.source_sha256.is_some());

    let record = &services.engine.lookup("13121000200", Some(2020))?[0];
    assert_eq!(record.metric("net_occupancy_base_pct"), None);
    assert!(record.metrics.contains_key("net_occupancy_base_pct"));
    Ok(())
}

#[tokio::test]
async fn restored_snapshot_keeps_the_persisted_version() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("igs.db");
    {
        let repo = Arc::new(SqliteRepository::open(&db)?);
        let services = AppServices::build(&AppConfig::default(), repo);
        services.ingest.ingest_path(&sample_path()).await?;
        services.ingest.ingest_path(&sample_path()).await?;
        services.ingest.ingest_path(&sample_path()).await?;
    }

    let repo = Arc::new(SqliteRepository::open(&db)?);
    let services = AppServices::build(&AppConfig::default(), repo.clone());
    let version = services.ingest.restore_snapshot().await?;

    assert_eq!(version, 3);
    assert_eq!(services.engine.status().version, 3);
    assert_eq!(repo.last_load().await?.unwrap().load_version, Some(3));

    let next = services.ingest.ingest_path(&sample_path()).await?;
    assert_eq!(next.load_version, Some(4));
    Ok(())
}
