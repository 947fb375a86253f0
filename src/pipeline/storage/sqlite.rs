use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::TractRepository;
use crate::common::error::{IgsError, Result};
use crate::domain::{OpportunityZone, TractId, TractRecord};
use crate::pipeline::report::LoadReport;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS tracts (
        tract_id            TEXT    NOT NULL,
        year                INTEGER NOT NULL,
        county              TEXT    NOT NULL,
        state               TEXT    NOT NULL,
        is_opportunity_zone TEXT    NOT NULL,
        PRIMARY KEY (tract_id, year)
    );
    CREATE INDEX IF NOT EXISTS idx_tracts_state  ON tracts (state);
    CREATE INDEX IF NOT EXISTS idx_tracts_county ON tracts (state, county);
    CREATE INDEX IF NOT EXISTS idx_tracts_year   ON tracts (year);
    CREATE TABLE IF NOT EXISTS tract_metrics (
        tract_id TEXT    NOT NULL,
        year     INTEGER NOT NULL,
        metric   TEXT    NOT NULL,
        value    REAL,
        PRIMARY KEY (tract_id, year, metric),
        FOREIGN KEY (tract_id, year) REFERENCES tracts (tract_id, year) ON DELETE CASCADE
    );
    CREATE TABLE IF NOT EXISTS load_runs (
        load_seq       INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id         TEXT    NOT NULL UNIQUE,
        finished_at    TEXT    NOT NULL,
        records_stored INTEGER NOT NULL,
        report_json    TEXT    NOT NULL
    );
"#;

/// SQLite-backed repository. Absent metric values are stored as SQL `NULL`.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened tract database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking SQLite work off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| IgsError::Io(std::io::Error::other(e.to_string())))?
    }
}

fn replace_records(conn: &mut Connection, records: &[TractRecord], report: &LoadReport) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM tract_metrics", [])?;
    tx.execute("DELETE FROM tracts", [])?;
    {
        let mut insert_tract = tx.prepare(
            "INSERT INTO tracts (tract_id, year, county, state, is_opportunity_zone)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut insert_metric = tx.prepare(
            "INSERT INTO tract_metrics (tract_id, year, metric, value) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for record in records {
            insert_tract.execute(params![
                record.tract_id.as_str(),
                record.year,
                record.county,
                record.state,
                record.is_opportunity_zone.as_str(),
            ])?;
            for (metric, value) in &record.metrics {
                insert_metric.execute(params![record.tract_id.as_str(), record.year, metric, value])?;
            }
        }
    }
    tx.execute(
        "INSERT INTO load_runs (run_id, finished_at, records_stored, report_json)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            report.run_id.to_string(),
            report.finished_at.to_rfc3339(),
            records.len() as i64,
            serde_json::to_string(report)?,
        ],
    )?;
    tx.commit()?;
    Ok(())
}

fn read_records(conn: &mut Connection) -> Result<Vec<TractRecord>> {
    let mut metrics: BTreeMap<(String, i32), BTreeMap<String, Option<f64>>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare("SELECT tract_id, year, metric, value FROM tract_metrics")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;
        for row in rows {
            let (tract_id, year, metric, value) = row?;
            metrics.entry((tract_id, year)).or_default().insert(metric, value);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT tract_id, year, county, state, is_opportunity_zone
         FROM tracts ORDER BY tract_id, year",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i32>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (tract_id, year, county, state, oz) = row?;
        let record_metrics = metrics.remove(&(tract_id.clone(), year)).unwrap_or_default();
        records.push(TractRecord {
            tract_id: TractId::parse(&tract_id)?,
            year,
            county,
            state,
            is_opportunity_zone: OpportunityZone::from_stored(&oz),
            metrics: record_metrics,
        });
    }
    Ok(records)
}

#[async_trait]
impl TractRepository for SqliteRepository {
    async fn replace_all(&self, records: &[TractRecord], report: &LoadReport) -> Result<()> {
        let records = records.to_vec();
        let report = report.clone();
        let count = records.len();
        self.with_conn(move |conn| replace_records(conn, &records, &report))
            .await?;
        debug!("Replaced SQLite record set with {} records", count);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TractRecord>> {
        self.with_conn(read_records).await
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM tracts", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn last_load(&self) -> Result<Option<LoadReport>> {
        self.with_conn(|conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT report_json FROM load_runs ORDER BY load_seq DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            match json {
                Some(j) => Ok(Some(serde_json::from_str(&j)?)),
                None => Ok(None),
            }
        })
        .await
    }
}
