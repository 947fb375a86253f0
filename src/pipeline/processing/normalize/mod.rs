use std::collections::BTreeMap;

use crate::pipeline::ingestion::{HeaderLayout, RawRow};

/// Result of coercing one metric cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    Present(f64),
    /// An explicit "not applicable" marker in the source
    Sentinel,
    /// Text that is not a finite number
    Unparseable,
}

impl CellValue {
    pub fn into_option(self) -> Option<f64> {
        match self {
            CellValue::Present(v) => Some(v),
            CellValue::Sentinel | CellValue::Unparseable => None,
        }
    }
}

/// Per-load cell counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub sentinel_cells: u64,
    pub coerced_cells: u64,
}

/// Turns raw metric cells into `Option<f64>`.
///
/// Absence is always `None`. A sentinel or a failed coercion never becomes
/// `0.0` and never fails the row.
#[derive(Debug, Clone)]
pub struct RowNormalizer {
    sentinels: Vec<String>,
}

impl RowNormalizer {
    pub fn new<S: AsRef<str>>(sentinels: &[S]) -> Self {
        let mut sentinels: Vec<String> = sentinels
            .iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .collect();
        // An empty cell is always absent
        if !sentinels.iter().any(|s| s.is_empty()) {
            sentinels.push(String::new());
        }
        Self { sentinels }
    }

    pub fn is_sentinel(&self, raw: &str) -> bool {
        let needle = raw.trim().to_lowercase();
        self.sentinels.iter().any(|s| *s == needle)
    }

    pub fn coerce(&self, raw: &str) -> CellValue {
        if self.is_sentinel(raw) {
            return CellValue::Sentinel;
        }
        let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
        match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() => CellValue::Present(v),
            _ => CellValue::Unparseable,
        }
    }

    /// Coerce every metric column of a row. Every declared metric column
    /// gets an entry, absent or not.
    pub fn normalize_metrics(
        &self,
        layout: &HeaderLayout,
        row: &RawRow,
        stats: &mut NormalizeStats,
    ) -> BTreeMap<String, Option<f64>> {
        layout
            .metric_columns()
            .map(|(idx, name)| {
                let value = match self.coerce(row.cell(idx)) {
                    CellValue::Present(v) => Some(v),
                    CellValue::Sentinel => {
                        stats.sentinel_cells += 1;
                        None
                    }
                    CellValue::Unparseable => {
                        stats.coerced_cells += 1;
                        None
                    }
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::DEFAULT_SENTINELS;
    use crate::domain::MetricCatalog;

    fn normalizer() -> RowNormalizer {
        RowNormalizer::new(DEFAULT_SENTINELS)
    }

    #[test]
    fn sentinels_become_absent_not_zero() {
        let n = normalizer();
        assert_eq!(n.coerce("N/A"), CellValue::Sentinel);
        assert_eq!(n.coerce(" n/a "), CellValue::Sentinel);
        assert_eq!(n.coerce("#N/A"), CellValue::Sentinel);
        assert_eq!(n.coerce(""), CellValue::Sentinel);
        assert_eq!(n.coerce("N/A").into_option(), None);
    }

    #[test]
    fn numbers_parse_and_garbage_is_absent() {
        let n = normalizer();
        assert_eq!(n.coerce("83"), CellValue::Present(83.0));
        assert_eq!(n.coerce(" 12.5 "), CellValue::Present(12.5));
        assert_eq!(n.coerce("1,234.5"), CellValue::Present(1234.5));
        assert_eq!(n.coerce("0"), CellValue::Present(0.0));
        assert_eq!(n.coerce("abc"), CellValue::Unparseable);
        assert_eq!(n.coerce("NaN"), CellValue::Unparseable);
        assert_eq!(n.coerce("inf"), CellValue::Unparseable);
    }

    #[test]
    fn custom_sentinels_still_treat_empty_as_absent() {
        let n = RowNormalizer::new(&["missing"]);
        assert_eq!(n.coerce("MISSING"), CellValue::Sentinel);
        assert_eq!(n.coerce("   "), CellValue::Sentinel);
    }

    #[test]
    fn normalize_metrics_counts_cells() {
        let catalog = MetricCatalog::igs();
        let header: Vec<String> = ["tract_id", "year", "county", "state", "internet_access_score", "growth", "place"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let layout = HeaderLayout::detect(&header, &catalog).unwrap();
        let row = RawRow {
            row_number: 2,
            byte_offset: 40,
            cells: ["13089021415", "2020", "DeKalb County", "Georgia", "83", "N/A", "high"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        let mut stats = NormalizeStats::default();
        let metrics = normalizer().normalize_metrics(&layout, &row, &mut stats);
        assert_eq!(metrics.get("internet_access_score"), Some(&Some(83.0)));
        assert_eq!(metrics.get("growth"), Some(&None));
        assert_eq!(metrics.get("place"), Some(&None));
        assert_eq!(stats.sentinel_cells, 1);
        assert_eq!(stats.coerced_cells, 1);
    }
}
