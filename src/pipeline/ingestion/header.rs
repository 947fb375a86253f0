use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::{canonicalize_label, MetricCatalog};

// Canonical labels accepted for each identity column
const TRACT_ID_LABELS: &[&str] = &["census_tract_fips_code", "census_tract_fips", "tract_id", "tract_fips"];
const YEAR_LABELS: &[&str] = &["year"];
const COUNTY_LABELS: &[&str] = &["county", "county_name"];
const STATE_LABELS: &[&str] = &["state", "state_name"];
const OPPORTUNITY_ZONE_LABELS: &[&str] = &["is_an_opportunity_zone", "is_opportunity_zone", "opportunity_zone"];

/// What a source column holds once its label has been canonicalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "metric", rename_all = "snake_case")]
pub enum ColumnRole {
    TractId,
    Year,
    County,
    State,
    OpportunityZone,
    Metric(String),
    Ignored,
}

/// Column layout of a detected header row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderLayout {
    pub roles: Vec<ColumnRole>,
    pub tract_id: usize,
    pub year: usize,
    pub county: usize,
    pub state: usize,
    pub opportunity_zone: Option<usize>,
    /// Raw labels of columns that map to nothing (index columns, unknown labels)
    pub unmapped_columns: Vec<String>,
}

impl HeaderLayout {
    /// Classify a candidate header row. Returns `None` unless all four
    /// identity columns (tract id, year, county, state) are present.
    ///
    /// A column whose metric was already claimed by an earlier column is
    /// ignored; the first one wins.
    pub fn detect(cells: &[String], catalog: &MetricCatalog) -> Option<Self> {
        let mut roles = Vec::with_capacity(cells.len());
        let mut unmapped_columns = Vec::new();
        let mut claimed = HashSet::new();

        for (idx, raw) in cells.iter().enumerate() {
            let canonical = canonicalize_label(raw);
            let role = match classify(&canonical, catalog) {
                ColumnRole::Metric(name) if !claimed.insert(name.clone()) => ColumnRole::Ignored,
                role => role,
            };
            if role == ColumnRole::Ignored {
                let label = raw.trim();
                unmapped_columns.push(if label.is_empty() {
                    format!("<column {}>", idx + 1)
                } else {
                    label.to_string()
                });
            }
            roles.push(role);
        }

        let find = |wanted: &ColumnRole| roles.iter().position(|r| r == wanted);
        let tract_id = find(&ColumnRole::TractId)?;
        let year = find(&ColumnRole::Year)?;
        let county = find(&ColumnRole::County)?;
        let state = find(&ColumnRole::State)?;
        let opportunity_zone = find(&ColumnRole::OpportunityZone);

        Some(Self {
            roles,
            tract_id,
            year,
            county,
            state,
            opportunity_zone,
            unmapped_columns,
        })
    }

    pub fn width(&self) -> usize {
        self.roles.len()
    }

    /// `(column index, metric name)` for every metric column
    pub fn metric_columns(&self) -> impl Iterator<Item = (usize, &str)> {
        self.roles.iter().enumerate().filter_map(|(idx, role)| match role {
            ColumnRole::Metric(name) => Some((idx, name.as_str())),
            _ => None,
        })
    }
}

fn classify(canonical: &str, catalog: &MetricCatalog) -> ColumnRole {
    if TRACT_ID_LABELS.contains(&canonical) {
        ColumnRole::TractId
    } else if YEAR_LABELS.contains(&canonical) {
        ColumnRole::Year
    } else if COUNTY_LABELS.contains(&canonical) {
        ColumnRole::County
    } else if STATE_LABELS.contains(&canonical) {
        ColumnRole::State
    } else if OPPORTUNITY_ZONE_LABELS.contains(&canonical) {
        ColumnRole::OpportunityZone
    } else if let Some(def) = catalog.resolve(canonical) {
        ColumnRole::Metric(def.name.clone())
    } else {
        ColumnRole::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_published_header() {
        let catalog = MetricCatalog::igs();
        let header = labels(&[
            "",
            "Is an Opportunity Zone",
            "Census Tract FIPS code",
            "County",
            "State",
            "Year",
            "Inclusive Growth Score",
            "Net Occupancy Base, %",
            "Mystery Column",
        ]);
        let layout = HeaderLayout::detect(&header, &catalog).unwrap();
        assert_eq!(layout.tract_id, 2);
        assert_eq!(layout.year, 5);
        assert_eq!(layout.opportunity_zone, Some(1));
        let metrics: Vec<_> = layout.metric_columns().map(|(_, m)| m).collect();
        assert_eq!(metrics, vec!["inclusive_growth_score", "net_occupancy_base_pct"]);
        assert_eq!(layout.unmapped_columns, vec!["<column 1>", "Mystery Column"]);
    }

    #[test]
    fn category_row_is_not_a_header() {
        let catalog = MetricCatalog::igs();
        let categories = labels(&["", "", "", "", "", "", "Summary", "Place", "Place", "Economy"]);
        assert!(HeaderLayout::detect(&categories, &catalog).is_none());
    }

    #[test]
    fn repeated_metric_column_keeps_the_first() {
        let catalog = MetricCatalog::igs();
        let header = labels(&["tract_id", "year", "county", "state", "Place", "Place (Overall)", "igs"]);
        let layout = HeaderLayout::detect(&header, &catalog).unwrap();
        let metrics: Vec<_> = layout.metric_columns().collect();
        assert_eq!(metrics, vec![(4, "place"), (6, "inclusive_growth_score")]);
        assert_eq!(layout.unmapped_columns, vec!["Place (Overall)"]);
    }

    #[test]
    fn header_without_state_is_rejected() {
        let catalog = MetricCatalog::igs();
        let header = labels(&["tract_id", "year", "county", "internet_access_score"]);
        assert!(HeaderLayout::detect(&header, &catalog).is_none());
    }
}
