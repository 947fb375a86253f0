use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::common::error::RowRejectedError;

/// Structured summary of one ingestion run.
///
/// `rows_read` counts data rows after the header. Metadata rows before the
/// header and blank rows are reported separately and never count as read,
/// so `rows_loaded + rows_rejected == rows_read` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub source_path: Option<String>,
    pub source_sha256: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 1-based line of the detected header row
    pub header_row: u64,
    pub header_rows_skipped: u64,
    pub blank_rows_skipped: u64,
    pub rows_read: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    /// Distinct `(tract_id, year)` keys written
    pub records_stored: u64,
    /// Accepted rows whose key repeated an earlier row (later row wins)
    pub duplicate_keys: u64,
    pub sentinel_cells: u64,
    pub coerced_cells: u64,
    pub metric_columns: usize,
    pub unmapped_columns: Vec<String>,
    pub rejection_reasons: Vec<RowRejectedError>,
    pub rejection_summary: BTreeMap<String, u64>,
    /// Store version installed by this load; `None` for dry runs
    pub load_version: Option<u64>,
}

impl LoadReport {
    pub fn new(source_path: Option<String>, source_sha256: String) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            source_path,
            source_sha256,
            started_at: now,
            finished_at: now,
            header_row: 0,
            header_rows_skipped: 0,
            blank_rows_skipped: 0,
            rows_read: 0,
            rows_loaded: 0,
            rows_rejected: 0,
            records_stored: 0,
            duplicate_keys: 0,
            sentinel_cells: 0,
            coerced_cells: 0,
            metric_columns: 0,
            unmapped_columns: Vec::new(),
            rejection_reasons: Vec::new(),
            rejection_summary: BTreeMap::new(),
            load_version: None,
        }
    }

    pub fn record_rejection(&mut self, rejection: RowRejectedError) {
        self.rows_rejected += 1;
        *self
            .rejection_summary
            .entry(rejection.reason.label().to_string())
            .or_insert(0) += 1;
        self.rejection_reasons.push(rejection);
    }

    pub fn is_consistent(&self) -> bool {
        self.rows_loaded + self.rows_rejected == self.rows_read
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::RejectionReason;

    #[test]
    fn rejections_are_counted_and_summarized() {
        let mut report = LoadReport::new(None, "abc".into());
        report.rows_read = 3;
        report.rows_loaded = 1;
        for row in [4, 9] {
            report.record_rejection(RowRejectedError {
                row_number: row,
                byte_offset: 0,
                reason: RejectionReason::MalformedTractId {
                    value: "123".into(),
                },
            });
        }
        assert_eq!(report.rows_rejected, 2);
        assert_eq!(report.rejection_summary.get("malformed_tract_id"), Some(&2));
        assert!(report.is_consistent());
    }
}
