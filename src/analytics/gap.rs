//! Peer-group gap analysis for a single tract-year.

use serde::{Deserialize, Serialize};

use super::filter::TractFilter;
use super::grouping::MetricSample;
use super::stats;
use crate::domain::{Computed, InsufficientDataError, TractId, TractRecord};
use crate::pipeline::storage::TractSnapshot;

/// Which records a tract is compared against. Peers always share the
/// target's year and never include the target itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerGroup {
    #[default]
    State,
    County,
    /// Records matching an explicit filter; its `year` is ignored
    Filter { filter: TractFilter },
}

impl PeerGroup {
    pub fn members<'a>(&self, snapshot: &'a TractSnapshot, target: &TractRecord) -> Vec<&'a TractRecord> {
        let candidates = match self {
            PeerGroup::State => snapshot.in_state(&target.state),
            PeerGroup::County => snapshot.in_county(&target.state, &target.county),
            PeerGroup::Filter { filter } => {
                let mut scoped = filter.clone();
                scoped.year = Some(target.year);
                scoped.select(snapshot)
            }
        };
        candidates
            .into_iter()
            .filter(|r| r.year == target.year && r.tract_id != target.tract_id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    pub metric: String,
    pub tract_value: Option<f64>,
    pub peer_average: Computed<f64>,
    /// Peers with a present value for the metric
    pub peer_count: usize,
    /// `tract_value - peer_average`
    pub gap: Computed<f64>,
    /// `gap / peer_average`, as a ratio
    pub relative_gap: Computed<f64>,
}

impl GapEntry {
    pub fn compute(metric: &str, target: &TractRecord, peers: &[&TractRecord]) -> Self {
        let sample = MetricSample::collect(peers.iter().copied(), metric);
        let peer_average = match stats::mean(&sample.values) {
            Computed::Value(v) => Computed::Value(v),
            Computed::Undefined(_) => Computed::Undefined(InsufficientDataError::PeerAverageUndefined {
                metric: metric.to_string(),
            }),
        };
        let tract_value = target.metric(metric);

        let gap = match (tract_value, &peer_average) {
            (None, _) => Computed::Undefined(InsufficientDataError::TargetValueAbsent {
                metric: metric.to_string(),
            }),
            (Some(_), Computed::Undefined(reason)) => Computed::Undefined(reason.clone()),
            (Some(value), Computed::Value(avg)) => Computed::Value(value - avg),
        };
        let relative_gap = gap.clone().and_then(|g| match peer_average.get() {
            Some(avg) if avg != 0.0 => Computed::Value(g / avg),
            _ => Computed::Undefined(InsufficientDataError::ZeroBaseline {
                metric: metric.to_string(),
            }),
        });

        Self {
            metric: metric.to_string(),
            tract_value,
            peer_count: sample.len(),
            peer_average,
            gap,
            relative_gap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub tract_id: TractId,
    pub year: i32,
    pub state: String,
    pub county: String,
    pub peer_group: PeerGroup,
    /// Peer records considered, before per-metric absence is dropped
    pub peer_records: usize,
    pub entries: Vec<GapEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OpportunityZone;
    use std::collections::BTreeMap;

    fn record(id: &str, county: &str, metrics: &[(&str, Option<f64>)]) -> TractRecord {
        TractRecord {
            tract_id: TractId::parse(id).unwrap(),
            year: 2020,
            county: county.into(),
            state: "Georgia".into(),
            is_opportunity_zone: OpportunityZone::Unknown,
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn gap_is_value_minus_peer_mean() {
        let target = record("13089021415", "DeKalb County", &[("growth", Some(70.0))]);
        let a = record("13089021500", "DeKalb County", &[("growth", Some(40.0))]);
        let b = record("13121000100", "Fulton County", &[("growth", Some(60.0))]);
        let entry = GapEntry::compute("growth", &target, &[&a, &b]);
        assert_eq!(entry.peer_average.get(), Some(50.0));
        assert_eq!(entry.gap.get(), Some(20.0));
        assert_eq!(entry.relative_gap.get(), Some(0.4));
        assert_eq!(entry.peer_count, 2);
    }

    #[test]
    fn partial_results_when_peers_lack_a_metric() {
        let target = record(
            "13089021415",
            "DeKalb County",
            &[("growth", Some(70.0)), ("inclusion", Some(30.0))],
        );
        let peer = record("13121000100", "Fulton County", &[("growth", Some(50.0)), ("inclusion", None)]);

        let growth = GapEntry::compute("growth", &target, &[&peer]);
        let inclusion = GapEntry::compute("inclusion", &target, &[&peer]);
        assert_eq!(growth.gap.get(), Some(20.0));
        assert!(matches!(
            inclusion.gap,
            Computed::Undefined(InsufficientDataError::PeerAverageUndefined { .. })
        ));
    }

    #[test]
    fn absent_target_value_is_not_computable() {
        let target = record("13089021415", "DeKalb County", &[("growth", None)]);
        let peer = record("13121000100", "Fulton County", &[("growth", Some(50.0))]);
        let entry = GapEntry::compute("growth", &target, &[&peer]);
        assert_eq!(entry.peer_average.get(), Some(50.0));
        assert!(matches!(
            entry.gap,
            Computed::Undefined(InsufficientDataError::TargetValueAbsent { .. })
        ));
        assert!(!entry.relative_gap.is_defined());
    }

    #[test]
    fn peers_exclude_target_and_other_years() {
        let target = record("13089021415", "DeKalb County", &[]);
        let mut other_year = record("13121000100", "Fulton County", &[]);
        other_year.year = 2021;
        let snapshot = TractSnapshot::build(
            vec![
                target.clone(),
                other_year,
                record("13121000200", "Fulton County", &[]),
                record("13089021500", "DeKalb County", &[]),
            ],
            1,
            None,
        );
        assert_eq!(PeerGroup::State.members(&snapshot, &target).len(), 2);
        let county = PeerGroup::County.members(&snapshot, &target);
        assert_eq!(county.len(), 1);
        assert_eq!(county[0].tract_id.as_str(), "13089021500");
    }
}
