use serde::{Deserialize, Serialize};

use crate::common::constants::TREND_STABLE_BAND;
use crate::domain::{TractId, TractRecord};

/// What the store holds for one year of a tract's history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Observation {
    Value(f64),
    /// A record exists for the year but the metric is absent
    Absent,
    /// No record for the year; never interpolated
    NoRecord,
}

impl Observation {
    pub fn value(&self) -> Option<f64> {
        match self {
            Observation::Value(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub year: i32,
    pub observation: Observation,
    /// Difference to the previous present value
    pub change: Option<f64>,
    /// `change` as a percentage of the previous present value
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl TrendDirection {
    pub fn of(change: Option<f64>) -> Self {
        match change {
            Some(c) if c > TREND_STABLE_BAND => TrendDirection::Improving,
            Some(c) if c < -TREND_STABLE_BAND => TrendDirection::Declining,
            _ => TrendDirection::Stable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub tract_id: TractId,
    pub state: String,
    pub county: String,
    pub metric: String,
    pub points: Vec<TrendPoint>,
    /// Last present value minus first present value
    pub overall_change: Option<f64>,
    pub overall_change_pct: Option<f64>,
    /// `overall_change` spread over the present values
    pub avg_annual_change: Option<f64>,
    pub direction: TrendDirection,
}

impl Trend {
    /// `history` must be one tract's records in chronological order and
    /// non-empty.
    pub fn build(metric: &str, history: &[&TractRecord]) -> Option<Self> {
        let first = history.first()?;
        let last = history.last()?;

        let mut points = Vec::new();
        let mut records = history.iter().peekable();
        let mut previous: Option<f64> = None;
        for year in first.year..=last.year {
            let observation = match records.next_if(|r| r.year == year) {
                Some(record) => record
                    .metric(metric)
                    .map(Observation::Value)
                    .unwrap_or(Observation::Absent),
                None => Observation::NoRecord,
            };

            let (change, change_pct) = match (observation.value(), previous) {
                (Some(value), Some(prev)) => {
                    let change = value - prev;
                    let pct = (prev != 0.0).then(|| change / prev * 100.0);
                    (Some(change), pct)
                }
                _ => (None, None),
            };
            if let Some(value) = observation.value() {
                previous = Some(value);
            }
            points.push(TrendPoint {
                year,
                observation,
                change,
                change_pct,
            });
        }

        let present: Vec<f64> = points.iter().filter_map(|p| p.observation.value()).collect();
        let (overall_change, overall_change_pct, avg_annual_change) = match present.as_slice() {
            [start, .., end] => {
                let change = end - start;
                (
                    Some(change),
                    (*start != 0.0).then(|| change / start * 100.0),
                    Some(change / (present.len() - 1) as f64),
                )
            }
            _ => (None, None, None),
        };

        Some(Self {
            tract_id: first.tract_id.clone(),
            state: first.state.clone(),
            county: first.county.clone(),
            metric: metric.to_string(),
            points,
            overall_change,
            overall_change_pct,
            avg_annual_change,
            direction: TrendDirection::of(overall_change),
        })
    }
}
