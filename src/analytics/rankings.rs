use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::{TractId, TractRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTract {
    /// 1 is the highest value
    pub rank: usize,
    pub tract_id: TractId,
    pub year: i32,
    pub state: String,
    pub county: String,
    pub value: f64,
    /// Share of ranked tracts at or below this one
    pub percentile: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rankings {
    pub metric: String,
    /// Records with a present value
    pub total: usize,
    /// Records in scope without a value, left out of the ranking
    pub unranked: usize,
    pub top: Vec<RankedTract>,
    /// Lowest value first
    pub bottom: Vec<RankedTract>,
}

impl Rankings {
    pub fn build(metric: &str, records: &[&TractRecord], limit: usize) -> Self {
        let mut valued: Vec<(&TractRecord, f64)> = records
            .iter()
            .filter_map(|r| r.metric(metric).map(|v| (*r, v)))
            .collect();
        let unranked = records.len() - valued.len();

        // Descending by value; ties fall back to key order so output is stable
        valued.sort_by(|(ra, a), (rb, b)| match b.total_cmp(a) {
            Ordering::Equal => ra.key().cmp(&rb.key()),
            other => other,
        });

        let total = valued.len();
        let ranked = |idx: usize| {
            let (record, value) = valued[idx];
            let rank = idx + 1;
            RankedTract {
                rank,
                tract_id: record.tract_id.clone(),
                year: record.year,
                state: record.state.clone(),
                county: record.county.clone(),
                value,
                percentile: (total - rank + 1) as f64 / total as f64 * 100.0,
            }
        };

        let take = limit.min(total);
        let top = (0..take).map(&ranked).collect();
        let bottom = (0..take).map(|i| ranked(total - 1 - i)).collect();

        Self {
            metric: metric.to_string(),
            total,
            unranked,
            top,
            bottom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OpportunityZone;

    fn record(id: &str, igs: Option<f64>) -> TractRecord {
        TractRecord {
            tract_id: TractId::parse(id).unwrap(),
            year: 2022,
            county: "Fulton County".into(),
            state: "Georgia".into(),
            is_opportunity_zone: OpportunityZone::No,
            metrics: [("inclusive_growth_score".to_string(), igs)].into_iter().collect(),
        }
    }

    #[test]
    fn ranks_top_and_bottom_with_percentiles() {
        let records = [
            record("13121000100", Some(30.0)),
            record("13121000200", Some(90.0)),
            record("13121000300", None),
            record("13121000400", Some(60.0)),
            record("13121000500", Some(75.0)),
        ];
        let refs: Vec<&TractRecord> = records.iter().collect();
        let rankings = Rankings::build("inclusive_growth_score", &refs, 2);

        assert_eq!(rankings.total, 4);
        assert_eq!(rankings.unranked, 1);
        let top: Vec<f64> = rankings.top.iter().map(|r| r.value).collect();
        assert_eq!(top, vec![90.0, 75.0]);
        assert_eq!(rankings.top[0].percentile, 100.0);
        let bottom: Vec<(usize, f64)> = rankings.bottom.iter().map(|r| (r.rank, r.value)).collect();
        assert_eq!(bottom, vec![(4, 30.0), (3, 60.0)]);
        assert_eq!(rankings.bottom[0].percentile, 25.0);
    }

    #[test]
    fn limit_larger_than_population() {
        let records = [record("13121000100", Some(30.0))];
        let refs: Vec<&TractRecord> = records.iter().collect();
        let rankings = Rankings::build("inclusive_growth_score", &refs, 10);
        assert_eq!(rankings.top.len(), 1);
        assert_eq!(rankings.bottom.len(), 1);
    }
}
