use crate::common::error::RejectionReason;
use crate::domain::{OpportunityZone, TractId};
use crate::pipeline::ingestion::{HeaderLayout, RawRow};
use crate::pipeline::processing::normalize::RowNormalizer;

/// Identity fields of a row that passed the gate
#[derive(Debug, Clone, PartialEq)]
pub struct TractIdentity {
    pub tract_id: TractId,
    pub year: i32,
    pub county: String,
    pub state: String,
    pub is_opportunity_zone: OpportunityZone,
}

/// Configuration for identity validation
#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    pub year_min: i32,
    pub year_max: i32,
}

/// Rejects rows whose identity columns cannot be trusted. Metric cells are
/// never grounds for rejection.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    pub config: QualityGateConfig,
}

impl IdentityGate {
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    pub fn assess(
        &self,
        layout: &HeaderLayout,
        row: &RawRow,
        normalizer: &RowNormalizer,
    ) -> Result<TractIdentity, RejectionReason> {
        if row.cells.len() < layout.width() {
            return Err(RejectionReason::ColumnCount {
                expected: layout.width(),
                found: row.cells.len(),
            });
        }
        // Trailing cells beyond the header are tolerated only when blank
        if row.cells[layout.width()..].iter().any(|c| !c.is_empty()) {
            return Err(RejectionReason::ColumnCount {
                expected: layout.width(),
                found: row.cells.len(),
            });
        }

        let raw_id = row.cell(layout.tract_id);
        if normalizer.is_sentinel(raw_id) {
            return Err(RejectionReason::MissingField {
                field: "tract_id".to_string(),
            });
        }
        let tract_id = TractId::parse(raw_id).map_err(|_| RejectionReason::MalformedTractId {
            value: raw_id.to_string(),
        })?;

        let raw_year = row.cell(layout.year);
        if normalizer.is_sentinel(raw_year) {
            return Err(RejectionReason::MissingField {
                field: "year".to_string(),
            });
        }
        let year = parse_year(raw_year).ok_or_else(|| RejectionReason::InvalidYear {
            value: raw_year.to_string(),
        })?;
        if year < self.config.year_min || year > self.config.year_max {
            return Err(RejectionReason::YearOutOfRange {
                year,
                min: self.config.year_min,
                max: self.config.year_max,
            });
        }

        let county = required_text(row.cell(layout.county), "county", normalizer)?;
        let state = required_text(row.cell(layout.state), "state", normalizer)?;

        let is_opportunity_zone = layout
            .opportunity_zone
            .map(|idx| OpportunityZone::from_cell(row.cell(idx)))
            .unwrap_or_default();

        Ok(TractIdentity {
            tract_id,
            year,
            county,
            state,
            is_opportunity_zone,
        })
    }
}

// Accepts "2020" and float-formatted exports such as "2020.0"
fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(y) = raw.parse::<i32>() {
        return Some(y);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

fn required_text(
    raw: &str,
    field: &str,
    normalizer: &RowNormalizer,
) -> Result<String, RejectionReason> {
    if normalizer.is_sentinel(raw) {
        Err(RejectionReason::MissingField {
            field: field.to_string(),
        })
    } else {
        Ok(raw.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::DEFAULT_SENTINELS;
    use crate::domain::MetricCatalog;

    fn layout() -> HeaderLayout {
        let header: Vec<String> = ["Is an Opportunity Zone", "Census Tract FIPS code", "County", "State", "Year", "Growth"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        HeaderLayout::detect(&header, &MetricCatalog::igs()).unwrap()
    }

    fn row(cells: &[&str]) -> RawRow {
        RawRow {
            row_number: 7,
            byte_offset: 512,
            cells: cells.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn gate() -> IdentityGate {
        IdentityGate::new(QualityGateConfig {
            year_min: 2017,
            year_max: 2024,
        })
    }

    #[test]
    fn accepts_valid_identity() {
        let n = RowNormalizer::new(DEFAULT_SENTINELS);
        let id = gate()
            .assess(&layout(), &row(&["Yes", "13089021415", "DeKalb County", "Georgia", "2020.0", "N/A"]), &n)
            .unwrap();
        assert_eq!(id.tract_id.as_str(), "13089021415");
        assert_eq!(id.year, 2020);
        assert_eq!(id.is_opportunity_zone, OpportunityZone::Yes);
    }

    #[test]
    fn rejects_malformed_tract_id() {
        let n = RowNormalizer::new(DEFAULT_SENTINELS);
        let err = gate()
            .assess(&layout(), &row(&["No", "13089021", "DeKalb County", "Georgia", "2020", "50"]), &n)
            .unwrap_err();
        assert_eq!(
            err,
            RejectionReason::MalformedTractId {
                value: "13089021".into()
            }
        );
    }

    #[test]
    fn rejects_year_problems() {
        let n = RowNormalizer::new(DEFAULT_SENTINELS);
        let out_of_range = gate()
            .assess(&layout(), &row(&["No", "13089021415", "DeKalb County", "Georgia", "2031", "50"]), &n)
            .unwrap_err();
        assert!(matches!(out_of_range, RejectionReason::YearOutOfRange { year: 2031, .. }));

        let garbage = gate()
            .assess(&layout(), &row(&["No", "13089021415", "DeKalb County", "Georgia", "twenty", "50"]), &n)
            .unwrap_err();
        assert!(matches!(garbage, RejectionReason::InvalidYear { .. }));
    }

    #[test]
    fn rejects_missing_state_and_short_rows() {
        let n = RowNormalizer::new(DEFAULT_SENTINELS);
        let missing = gate()
            .assess(&layout(), &row(&["No", "13089021415", "DeKalb County", "N/A", "2020", "50"]), &n)
            .unwrap_err();
        assert_eq!(missing, RejectionReason::MissingField { field: "state".into() });

        let short = gate()
            .assess(&layout(), &row(&["No", "13089021415", "DeKalb County"]), &n)
            .unwrap_err();
        assert_eq!(short, RejectionReason::ColumnCount { expected: 6, found: 3 });
    }

    #[test]
    fn tolerates_trailing_blank_cells() {
        let n = RowNormalizer::new(DEFAULT_SENTINELS);
        let ok = gate().assess(
            &layout(),
            &row(&["", "13089021415", "DeKalb County", "Georgia", "2020", "50", "", ""]),
            &n,
        );
        assert_eq!(ok.unwrap().is_opportunity_zone, OpportunityZone::Unknown);
    }
}
