use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::common::error::{IgsError, Result, RowRejectedError};
use crate::config::IngestConfig;
use crate::domain::{MetricCatalog, TractKey, TractRecord, METRIC_CATALOG};
use crate::pipeline::ingestion::SourceReader;
use crate::pipeline::processing::normalize::{NormalizeStats, RowNormalizer};
use crate::pipeline::processing::quality_gate::{IdentityGate, QualityGateConfig};
use crate::pipeline::report::LoadReport;

/// A fully built record set and the report that describes it. Nothing has
/// been written anywhere yet.
#[derive(Debug, Clone)]
pub struct PreparedLoad {
    /// Sorted by `(tract_id, year)`, keys unique
    pub records: Vec<TractRecord>,
    pub report: LoadReport,
}

/// Single-pass transformation of one raw source into a record set.
///
/// Pure with respect to its input: the same bytes always produce the same
/// records, which is what makes a reload idempotent.
pub struct IngestionPipeline {
    catalog: &'static MetricCatalog,
    normalizer: RowNormalizer,
    gate: IdentityGate,
    header_scan_limit: usize,
}

impl IngestionPipeline {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            catalog: &METRIC_CATALOG,
            normalizer: RowNormalizer::new(config.sentinels.as_slice()),
            gate: IdentityGate::new(QualityGateConfig {
                year_min: config.year_min,
                year_max: config.year_max,
            }),
            header_scan_limit: config.header_scan_limit,
        }
    }

    pub fn prepare(&self, bytes: &[u8], source_path: Option<&str>) -> Result<PreparedLoad> {
        let sha = hex::encode(Sha256::digest(bytes));
        let mut report = LoadReport::new(source_path.map(str::to_string), sha);

        let table = SourceReader::new(self.catalog, self.header_scan_limit).read(bytes)?;
        if table.rows.is_empty() {
            return Err(IgsError::MalformedSource {
                row: table.header_row,
                byte_offset: table.data_offset,
                message: "no data rows after header".to_string(),
            });
        }
        report.header_row = table.header_row;
        report.header_rows_skipped = table.header_rows_skipped;
        report.blank_rows_skipped = table.blank_rows_skipped;
        report.metric_columns = table.layout.metric_columns().count();
        report.unmapped_columns = table.layout.unmapped_columns.clone();

        if !report.unmapped_columns.is_empty() {
            debug!("Ignoring unmapped columns: {:?}", report.unmapped_columns);
        }

        let mut stats = NormalizeStats::default();
        let mut by_key: BTreeMap<TractKey, TractRecord> = BTreeMap::new();

        for row in &table.rows {
            report.rows_read += 1;

            let identity = match self.gate.assess(&table.layout, row, &self.normalizer) {
                Ok(identity) => identity,
                Err(reason) => {
                    debug!("Rejected row {}: {}", row.row_number, reason);
                    report.record_rejection(RowRejectedError {
                        row_number: row.row_number,
                        byte_offset: row.byte_offset,
                        reason,
                    });
                    continue;
                }
            };

            let metrics = self
                .normalizer
                .normalize_metrics(&table.layout, row, &mut stats);
            let record = TractRecord {
                tract_id: identity.tract_id,
                year: identity.year,
                county: identity.county,
                state: identity.state,
                is_opportunity_zone: identity.is_opportunity_zone,
                metrics,
            };

            if by_key.insert(record.key(), record).is_some() {
                report.duplicate_keys += 1;
            }
            report.rows_loaded += 1;
        }

        report.sentinel_cells = stats.sentinel_cells;
        report.coerced_cells = stats.coerced_cells;
        report.records_stored = by_key.len() as u64;
        report.finished_at = Utc::now();

        if report.rows_rejected > 0 {
            warn!(
                "Rejected {} of {} rows: {:?}",
                report.rows_rejected, report.rows_read, report.rejection_summary
            );
        }
        if report.duplicate_keys > 0 {
            warn!("{} rows repeated an existing (tract_id, year) key", report.duplicate_keys);
        }
        info!(
            "Prepared {} records from {} rows ({} loaded, {} rejected)",
            report.records_stored, report.rows_read, report.rows_loaded, report.rows_rejected
        );

        Ok(PreparedLoad {
            records: by_key.into_values().collect(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::RejectionReason;

    const SCENARIO: &str = "\
,,,,,Summary,Place,Economy
Is an Opportunity Zone,Census Tract FIPS code,County,State,Year,Inclusive Growth Score,Internet Access Score,Minority/Women Owned Businesses Score
No,13089021415,DeKalb County,Georgia,2020,45,83,61
Yes,13089021416,DeKalb County,Georgia,2020,38,70,N/A
No,13089021,DeKalb County,Georgia,2020,50,50,50
";

    fn pipeline() -> IngestionPipeline {
        IngestionPipeline::new(&IngestConfig::default())
    }

    #[test]
    fn scenario_block_counts_and_absence() {
        let load = pipeline().prepare(SCENARIO.as_bytes(), None).unwrap();
        let r = &load.report;
        assert_eq!(r.header_rows_skipped, 1);
        assert_eq!(r.rows_read, 3);
        assert_eq!(r.rows_loaded, 2);
        assert_eq!(r.rows_rejected, 1);
        assert!(r.is_consistent());
        assert!(matches!(
            r.rejection_reasons[0].reason,
            RejectionReason::MalformedTractId { .. }
        ));
        assert_eq!(r.rejection_reasons[0].row_number, 5);

        let first = &load.records[0];
        assert_eq!(first.metric("internet_access_score"), Some(83.0));
        assert_eq!(first.metric("minority_women_owned_businesses_score"), Some(61.0));

        let second = &load.records[1];
        assert_eq!(second.metric("minority_women_owned_businesses_score"), None);
        assert!(second
            .metrics
            .contains_key("minority_women_owned_businesses_score"));
        assert_eq!(r.sentinel_cells, 1);
    }

    #[test]
    fn same_input_same_records() {
        let a = pipeline().prepare(SCENARIO.as_bytes(), None).unwrap();
        let b = pipeline().prepare(SCENARIO.as_bytes(), None).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.report.source_sha256, b.report.source_sha256);
        assert_ne!(a.report.run_id, b.report.run_id);
    }

    #[test]
    fn later_duplicate_row_wins() {
        let source = "\
tract_id,year,county,state,growth
13089021415,2020,DeKalb County,Georgia,10
13089021415,2020,DeKalb County,Georgia,20
";
        let load = pipeline().prepare(source.as_bytes(), None).unwrap();
        assert_eq!(load.report.rows_loaded, 2);
        assert_eq!(load.report.duplicate_keys, 1);
        assert_eq!(load.report.records_stored, 1);
        assert_eq!(load.records[0].metric("growth"), Some(20.0));
    }

    #[test]
    fn headerless_source_aborts() {
        let err = pipeline()
            .prepare(b"just,some,numbers\n1,2,3\n", Some("bad.csv"))
            .unwrap_err();
        assert!(matches!(err, IgsError::MalformedSource { .. }));
    }

    #[test]
    fn header_without_data_rows_aborts() {
        let source = "tract_id,year,county,state,growth\n,,,,\n";
        match pipeline().prepare(source.as_bytes(), None).unwrap_err() {
            IgsError::MalformedSource { row, byte_offset, .. } => {
                assert_eq!(row, 1);
                assert_eq!(byte_offset, 34);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
