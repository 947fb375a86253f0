use serde::{Deserialize, Serialize};

use crate::common::error::{IgsError, Result};
use crate::domain::{MetricCatalog, OpportunityZone, TractRecord};
use crate::pipeline::storage::TractSnapshot;

/// `metric >= min`; records with the metric absent never match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub metric: String,
    pub min: f64,
}

/// Conjunction of optional predicates. The empty filter matches everything.
///
/// State and county compare case-insensitively against the stored values;
/// a value that matches nothing yields an empty selection, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TractFilter {
    pub state: Option<String>,
    pub county: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub thresholds: Vec<MetricThreshold>,
    pub opportunity_zone: Option<OpportunityZone>,
}

impl TractFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn min(mut self, metric: impl Into<String>, min: f64) -> Self {
        self.thresholds.push(MetricThreshold {
            metric: metric.into(),
            min,
        });
        self
    }

    pub fn opportunity_zone(mut self, zone: OpportunityZone) -> Self {
        self.opportunity_zone = Some(zone);
        self
    }

    /// Canonicalize threshold metric names, failing on unknown ones, and
    /// trim text predicates. Blank text predicates are dropped.
    pub fn resolve(&self, catalog: &MetricCatalog) -> Result<TractFilter> {
        let mut thresholds = Vec::with_capacity(self.thresholds.len());
        for t in &self.thresholds {
            if !t.min.is_finite() {
                return Err(IgsError::InvalidQuery(format!(
                    "threshold for {} must be a finite number",
                    t.metric
                )));
            }
            thresholds.push(MetricThreshold {
                metric: catalog.require(&t.metric)?.name.clone(),
                min: t.min,
            });
        }
        Ok(TractFilter {
            state: clean(&self.state),
            county: clean(&self.county),
            year: self.year,
            thresholds,
            opportunity_zone: self.opportunity_zone,
        })
    }

    pub fn matches(&self, record: &TractRecord) -> bool {
        if let Some(state) = &self.state {
            if !record.state.eq_ignore_ascii_case(state) {
                return false;
            }
        }
        if let Some(county) = &self.county {
            if !record.county.eq_ignore_ascii_case(county) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if record.year != year {
                return false;
            }
        }
        if let Some(zone) = self.opportunity_zone {
            if record.is_opportunity_zone != zone {
                return false;
            }
        }
        self.thresholds
            .iter()
            .all(|t| record.metric(&t.metric).is_some_and(|v| v >= t.min))
    }

    /// Matching records in `(tract_id, year)` order. Starts from the
    /// narrowest index the filter allows, then applies every predicate.
    pub fn select<'a>(&self, snapshot: &'a TractSnapshot) -> Vec<&'a TractRecord> {
        let candidates: Vec<&TractRecord> = if let Some(state) = &self.state {
            let mut hits: Vec<&TractRecord> = snapshot
                .states()
                .filter(|s| s.eq_ignore_ascii_case(state))
                .flat_map(|s| snapshot.in_state(s))
                .collect();
            // Distinct stored spellings of one state merge out of order
            hits.sort_by(|a, b| a.key().cmp(&b.key()));
            hits
        } else if let Some(year) = self.year {
            snapshot.in_year(year)
        } else {
            snapshot.records().iter().collect()
        };

        candidates
            .into_iter()
            .filter(|record| self.matches(record))
            .collect()
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Offset/limit window over an ordered result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Page {
    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TractId;
    use std::collections::BTreeMap;

    fn record(id: &str, year: i32, state: &str, county: &str, igs: Option<f64>) -> TractRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert("inclusive_growth_score".to_string(), igs);
        TractRecord {
            tract_id: TractId::parse(id).unwrap(),
            year,
            county: county.into(),
            state: state.into(),
            is_opportunity_zone: OpportunityZone::No,
            metrics,
        }
    }

    fn snapshot() -> TractSnapshot {
        TractSnapshot::build(
            vec![
                record("13089021415", 2020, "Georgia", "DeKalb County", Some(45.0)),
                record("13089021415", 2021, "Georgia", "DeKalb County", Some(55.0)),
                record("13121000100", 2020, "Georgia", "Fulton County", None),
                record("01001020100", 2020, "Alabama", "Autauga County", Some(70.0)),
            ],
            1,
            None,
        )
    }

    #[test]
    fn predicates_compose_conjunctively() {
        let snap = snapshot();
        let catalog = MetricCatalog::igs();
        let filter = TractFilter::new()
            .state("georgia")
            .year(2020)
            .min("Inclusive Growth Score", 40.0)
            .resolve(&catalog)
            .unwrap();
        let hits = filter.select(&snap);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].county, "DeKalb County");
    }

    #[test]
    fn absent_metric_never_passes_threshold() {
        let snap = snapshot();
        let filter = TractFilter::new()
            .county("Fulton County")
            .min("inclusive_growth_score", 0.0)
            .resolve(&MetricCatalog::igs())
            .unwrap();
        assert!(filter.select(&snap).is_empty());
    }

    #[test]
    fn unknown_state_is_empty_not_error() {
        let snap = snapshot();
        let filter = TractFilter::new().state("Atlantis").resolve(&MetricCatalog::igs()).unwrap();
        assert!(filter.select(&snap).is_empty());
    }

    #[test]
    fn unknown_threshold_metric_is_rejected() {
        let err = TractFilter::new()
            .min("bogus_metric", 1.0)
            .resolve(&MetricCatalog::igs())
            .unwrap_err();
        assert!(matches!(err, IgsError::UnknownMetric(_)));
    }

    #[test]
    fn empty_filter_selects_everything_in_key_order() {
        let snap = snapshot();
        let hits = TractFilter::default().select(&snap);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].state, "Alabama");
    }

    #[test]
    fn page_windows_results() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(Page::new(1, Some(2)).apply(items.clone()), vec![2, 3]);
        assert_eq!(Page::new(4, None).apply(items.clone()), vec![5]);
        assert!(Page::new(9, Some(2)).apply(items).is_empty());
    }
}
