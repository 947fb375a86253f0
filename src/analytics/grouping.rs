//! Grouping and value extraction shared by aggregation, correlation and
//! gap analysis.
//!
//! Every statistic in the engine reads metric values through
//! [`MetricSample`] or [`PairedSample`], which is where absent values are
//! dropped. No other code path turns records into numbers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::TractRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    State,
    County,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum GroupKey {
    State { state: String },
    County { state: String, county: String },
    Year { year: i32 },
}

impl GroupKey {
    pub fn of(record: &TractRecord, by: GroupBy) -> Self {
        match by {
            GroupBy::State => GroupKey::State {
                state: record.state.clone(),
            },
            GroupBy::County => GroupKey::County {
                state: record.state.clone(),
                county: record.county.clone(),
            },
            GroupBy::Year => GroupKey::Year { year: record.year },
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::State { state } => f.write_str(state),
            GroupKey::County { state, county } => write!(f, "{county}, {state}"),
            GroupKey::Year { year } => write!(f, "{year}"),
        }
    }
}

/// Partition records by `by`, keeping input order inside each group
pub fn group_records<'a, I>(records: I, by: GroupBy) -> BTreeMap<GroupKey, Vec<&'a TractRecord>>
where
    I: IntoIterator<Item = &'a TractRecord>,
{
    let mut groups: BTreeMap<GroupKey, Vec<&'a TractRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(GroupKey::of(record, by)).or_default().push(record);
    }
    groups
}

/// Present values of one metric over a record set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSample {
    pub values: Vec<f64>,
    /// Records without a value for the metric
    pub absent: usize,
}

impl MetricSample {
    pub fn collect<'a, I>(records: I, metric: &str) -> Self
    where
        I: IntoIterator<Item = &'a TractRecord>,
    {
        let mut sample = Self::default();
        for record in records {
            match record.metric(metric) {
                Some(v) => sample.values.push(v),
                None => sample.absent += 1,
            }
        }
        sample
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pairwise-complete values of two metrics: a record contributes only when
/// both are present
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedSample {
    pub pairs: Vec<(f64, f64)>,
    /// Records missing either metric
    pub incomplete: usize,
}

impl PairedSample {
    pub fn collect<'a, I>(records: I, metric_a: &str, metric_b: &str) -> Self
    where
        I: IntoIterator<Item = &'a TractRecord>,
    {
        let mut sample = Self::default();
        for record in records {
            match (record.metric(metric_a), record.metric(metric_b)) {
                (Some(a), Some(b)) => sample.pairs.push((a, b)),
                _ => sample.incomplete += 1,
            }
        }
        sample
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OpportunityZone, TractId};

    fn record(id: &str, year: i32, state: &str, a: Option<f64>, b: Option<f64>) -> TractRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert("a".to_string(), a);
        metrics.insert("b".to_string(), b);
        TractRecord {
            tract_id: TractId::parse(id).unwrap(),
            year,
            county: "Some County".into(),
            state: state.into(),
            is_opportunity_zone: OpportunityZone::Unknown,
            metrics,
        }
    }

    #[test]
    fn samples_drop_absent_values() {
        let records = vec![
            record("01001020100", 2020, "Alabama", Some(1.0), None),
            record("01001020200", 2020, "Alabama", None, Some(2.0)),
            record("01001020300", 2020, "Alabama", Some(0.0), Some(3.0)),
        ];
        let single = MetricSample::collect(&records, "a");
        assert_eq!(single.values, vec![1.0, 0.0]);
        assert_eq!(single.absent, 1);

        let paired = PairedSample::collect(&records, "a", "b");
        assert_eq!(paired.pairs, vec![(0.0, 3.0)]);
        assert_eq!(paired.incomplete, 2);
    }

    #[test]
    fn groups_by_key() {
        let records = vec![
            record("13089021415", 2020, "Georgia", None, None),
            record("01001020100", 2021, "Alabama", None, None),
            record("01001020200", 2020, "Alabama", None, None),
        ];
        let by_state = group_records(&records, GroupBy::State);
        let keys: Vec<String> = by_state.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["Alabama", "Georgia"]);
        assert_eq!(by_state.values().next().unwrap().len(), 2);

        let by_year = group_records(&records, GroupBy::Year);
        assert_eq!(by_year.get(&GroupKey::Year { year: 2020 }).unwrap().len(), 2);
    }
}
