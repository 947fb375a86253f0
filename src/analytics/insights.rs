//! Derived reports built on top of the core statistics: state listing,
//! year-over-year comparison, the county opportunity index, tract
//! scorecards and regional insights.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::grouping::{group_records, GroupBy, GroupKey, MetricSample};
use super::stats;
use crate::common::constants::{
    COMMUNITY_METRIC, COMPOSITE_METRIC, ECONOMY_METRIC, KEY_EQUITY_METRICS, OPPORTUNITY_WEIGHTS,
    PLACE_METRIC, SCORECARD_INDICATORS, STRENGTH_THRESHOLD, TREND_STABLE_BAND, WEAKNESS_THRESHOLD,
};
use crate::domain::{Computed, InsufficientDataError, MetricCatalog, TractId, TractRecord};

// Score a tract must reach to count as at or above the dataset baseline
const BASELINE_SCORE: f64 = 50.0;
const HIGH_PERFORMING_SCORE: f64 = 70.0;
const STRONG_PILLAR_AVERAGE: f64 = 60.0;
const SEVERE_DISPARITY: f64 = 40.0;
const MODERATE_DISPARITY: f64 = 25.0;
const TOP_DISPARITIES: usize = 5;
const SCORECARD_HIGHLIGHTS: usize = 3;

fn display_name(catalog: &MetricCatalog, metric: &str) -> String {
    catalog
        .lookup(metric)
        .map(|d| d.display_name.clone())
        .unwrap_or_else(|| metric.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    pub state: String,
    /// Distinct tracts across all years
    pub tract_count: usize,
}

pub fn summarize_states<'a, I>(records: I) -> Vec<StateSummary>
where
    I: IntoIterator<Item = &'a TractRecord>,
{
    let mut tracts: BTreeMap<&str, BTreeSet<&TractId>> = BTreeMap::new();
    for record in records {
        if record.state.is_empty() {
            continue;
        }
        tracts
            .entry(record.state.as_str())
            .or_default()
            .insert(&record.tract_id);
    }
    tracts
        .into_iter()
        .map(|(state, ids)| StateSummary {
            state: state.to_string(),
            tract_count: ids.len(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTrend {
    Improved,
    Declined,
    Stable,
}

impl ChangeTrend {
    fn of(change: Option<f64>) -> Self {
        match change {
            Some(c) if c > TREND_STABLE_BAND => ChangeTrend::Improved,
            Some(c) if c < -TREND_STABLE_BAND => ChangeTrend::Declined,
            _ => ChangeTrend::Stable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearOverYear {
    pub metric: String,
    pub year_start: i32,
    pub year_end: i32,
    pub start_average: Computed<f64>,
    pub end_average: Computed<f64>,
    pub absolute_change: Computed<f64>,
    pub percent_change: Computed<f64>,
    pub trend: ChangeTrend,
}

impl YearOverYear {
    pub fn compute(
        metric: &str,
        year_start: i32,
        year_end: i32,
        start: &[&TractRecord],
        end: &[&TractRecord],
    ) -> Self {
        let start_average = stats::mean(&MetricSample::collect(start.iter().copied(), metric).values);
        let end_average = stats::mean(&MetricSample::collect(end.iter().copied(), metric).values);

        let absolute_change = match (&start_average, &end_average) {
            (Computed::Value(s), Computed::Value(e)) => Computed::Value(e - s),
            (Computed::Undefined(reason), _) | (_, Computed::Undefined(reason)) => {
                Computed::Undefined(reason.clone())
            }
        };
        let percent_change = absolute_change.clone().and_then(|change| match start_average.get() {
            Some(s) if s != 0.0 => Computed::Value(change / s * 100.0),
            _ => Computed::Undefined(InsufficientDataError::ZeroBaseline {
                metric: metric.to_string(),
            }),
        });

        Self {
            metric: metric.to_string(),
            year_start,
            year_end,
            trend: ChangeTrend::of(absolute_change.get()),
            start_average,
            end_average,
            absolute_change,
            percent_change,
        }
    }
}

/// Metrics compared when a year-over-year request names none
pub fn default_year_over_year_metrics() -> Vec<String> {
    KEY_EQUITY_METRICS.iter().map(|m| m.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityCategory {
    Excellent,
    Good,
    Moderate,
    Developing,
}

impl OpportunityCategory {
    pub fn of(score: f64) -> Self {
        if score >= 65.0 {
            OpportunityCategory::Excellent
        } else if score >= 50.0 {
            OpportunityCategory::Good
        } else if score >= 40.0 {
            OpportunityCategory::Moderate
        } else {
            OpportunityCategory::Developing
        }
    }
}

/// Weighted score of one tract, renormalized over the weights whose metric
/// is present. `None` when none of them is.
pub fn opportunity_score(record: &TractRecord) -> Option<f64> {
    let (weighted, total_weight) = OPPORTUNITY_WEIGHTS
        .iter()
        .filter_map(|(metric, weight)| record.metric(metric).map(|v| (v * weight, *weight)))
        .fold((0.0, 0.0), |(sum, total), (wv, w)| (sum + wv, total + w));
    (total_weight > 0.0).then(|| weighted / total_weight)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyOpportunity {
    pub rank: usize,
    pub state: String,
    pub county: String,
    pub score: f64,
    pub category: OpportunityCategory,
    /// Tracts with a computable score
    pub tract_count: usize,
    pub metric_averages: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityIndex {
    pub year: Option<i32>,
    pub counties: Vec<CountyOpportunity>,
}

impl OpportunityIndex {
    pub fn build(year: Option<i32>, records: &[&TractRecord]) -> Self {
        let mut counties: Vec<CountyOpportunity> = group_records(records.iter().copied(), GroupBy::County)
            .into_iter()
            .filter_map(|(key, members)| {
                let GroupKey::County { state, county } = key else {
                    return None;
                };
                let scores: Vec<f64> = members.iter().filter_map(|r| opportunity_score(r)).collect();
                let score = stats::mean(&scores).get()?;
                let metric_averages = OPPORTUNITY_WEIGHTS
                    .iter()
                    .map(|(metric, _)| {
                        let sample = MetricSample::collect(members.iter().copied(), metric);
                        (metric.to_string(), stats::mean(&sample.values).get())
                    })
                    .collect();
                Some(CountyOpportunity {
                    rank: 0,
                    state,
                    county,
                    score,
                    category: OpportunityCategory::of(score),
                    tract_count: scores.len(),
                    metric_averages,
                })
            })
            .collect();

        counties.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| (&a.state, &a.county).cmp(&(&b.state, &b.county)))
        });
        for (idx, county) in counties.iter_mut().enumerate() {
            county.rank = idx + 1;
        }
        Self { year, counties }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Grade {
    pub fn of(score: Option<f64>) -> Self {
        match score {
            None => Grade::NotAvailable,
            Some(s) if s >= 80.0 => Grade::A,
            Some(s) if s >= 70.0 => Grade::B,
            Some(s) if s >= 60.0 => Grade::C,
            Some(s) if s >= 50.0 => Grade::D,
            Some(_) => Grade::F,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedScore {
    pub metric: String,
    pub score: Option<f64>,
    pub grade: Grade,
}

impl GradedScore {
    fn of(record: &TractRecord, metric: &str) -> Self {
        let score = record.metric(metric);
        Self {
            metric: metric.to_string(),
            score,
            grade: Grade::of(score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReading {
    pub metric: String,
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub tract_id: TractId,
    pub year: i32,
    pub state: String,
    pub county: String,
    pub overall: GradedScore,
    pub place: GradedScore,
    pub economy: GradedScore,
    pub community: GradedScore,
    /// Highest indicators at or above the strength threshold
    pub strengths: Vec<IndicatorReading>,
    /// Lowest indicators below the weakness threshold
    pub improvement_areas: Vec<IndicatorReading>,
    pub state_average: Computed<f64>,
    pub vs_state_average: Computed<f64>,
    /// Share of the state's tracts (same year) scoring below this one
    pub state_percentile: Computed<f64>,
}

impl Scorecard {
    /// `state_records` are the tract's state for the same year, the tract
    /// itself included.
    pub fn build(record: &TractRecord, state_records: &[&TractRecord]) -> Self {
        let mut strengths = Vec::new();
        let mut improvement_areas = Vec::new();
        for (metric, label) in SCORECARD_INDICATORS {
            let Some(value) = record.metric(metric) else {
                continue;
            };
            let reading = IndicatorReading {
                metric: metric.to_string(),
                label: label.to_string(),
                value,
            };
            if value >= STRENGTH_THRESHOLD {
                strengths.push(reading);
            } else if value < WEAKNESS_THRESHOLD {
                improvement_areas.push(reading);
            }
        }
        strengths.sort_by(|a, b| b.value.total_cmp(&a.value));
        strengths.truncate(SCORECARD_HIGHLIGHTS);
        improvement_areas.sort_by(|a, b| a.value.total_cmp(&b.value));
        improvement_areas.truncate(SCORECARD_HIGHLIGHTS);

        let state_values = MetricSample::collect(state_records.iter().copied(), COMPOSITE_METRIC).values;
        let state_average = stats::mean(&state_values);
        let (vs_state_average, state_percentile) = match record.metric(COMPOSITE_METRIC) {
            Some(own) => (
                state_average.clone().map(|avg| own - avg),
                stats::percentile_rank(&state_values, own),
            ),
            None => {
                let absent = InsufficientDataError::TargetValueAbsent {
                    metric: COMPOSITE_METRIC.to_string(),
                };
                (Computed::Undefined(absent.clone()), Computed::Undefined(absent))
            }
        };

        Self {
            tract_id: record.tract_id.clone(),
            year: record.year,
            state: record.state.clone(),
            county: record.county.clone(),
            overall: GradedScore::of(record, COMPOSITE_METRIC),
            place: GradedScore::of(record, PLACE_METRIC),
            economy: GradedScore::of(record, ECONOMY_METRIC),
            community: GradedScore::of(record, COMMUNITY_METRIC),
            strengths,
            improvement_areas,
            state_average,
            vs_state_average,
            state_percentile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarSummary {
    pub pillar: String,
    pub metric: String,
    pub average: Computed<f64>,
    pub min: Computed<f64>,
    pub max: Computed<f64>,
    pub at_or_above_baseline: usize,
    pub below_baseline: usize,
    pub insight: String,
}

impl PillarSummary {
    fn compute(pillar: &str, metric: &str, records: &[&TractRecord]) -> Self {
        let values = MetricSample::collect(records.iter().copied(), metric).values;
        let above = values.iter().filter(|v| **v >= BASELINE_SCORE).count();
        let below = values.len() - above;
        let average = stats::mean(&values);

        let insight = match average.get() {
            None => "Insufficient data".to_string(),
            Some(avg) if avg >= STRONG_PILLAR_AVERAGE => format!(
                "{pillar} metrics show strong performance with {above}/{} tracts above the baseline",
                values.len()
            ),
            Some(avg) if avg >= BASELINE_SCORE => {
                format!("{pillar} metrics are near the baseline with room for improvement")
            }
            Some(_) => format!(
                "{pillar} metrics indicate opportunity for intervention: {below}/{} tracts below the baseline",
                values.len()
            ),
        };

        Self {
            pillar: pillar.to_string(),
            metric: metric.to_string(),
            min: stats::min(&values),
            max: stats::max(&values),
            average,
            at_or_above_baseline: above,
            below_baseline: below,
            insight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisparityLevel {
    Severe,
    Moderate,
    Low,
}

impl DisparityLevel {
    pub fn of(range: f64) -> Self {
        if range > SEVERE_DISPARITY {
            DisparityLevel::Severe
        } else if range > MODERATE_DISPARITY {
            DisparityLevel::Moderate
        } else {
            DisparityLevel::Low
        }
    }

    pub fn interpretation(&self) -> &'static str {
        match self {
            DisparityLevel::Severe => "Severe disparity: significant intervention needed",
            DisparityLevel::Moderate => "Moderate disparity: targeted programs recommended",
            DisparityLevel::Low => "Low disparity: relatively equitable distribution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disparity {
    pub metric: String,
    pub display_name: String,
    /// Max minus min over present values
    pub range: f64,
    /// Sample standard deviation over the mean, as a percentage
    pub coefficient_of_variation: Computed<f64>,
    pub level: DisparityLevel,
}

impl Disparity {
    /// `None` below two present values
    fn compute(catalog: &MetricCatalog, metric: &str, records: &[&TractRecord]) -> Option<Self> {
        let values = MetricSample::collect(records.iter().copied(), metric).values;
        let sd = stats::std_dev(&values).get()?;
        let range = stats::max(&values).get()? - stats::min(&values).get()?;
        let coefficient_of_variation = match stats::mean(&values).get() {
            Some(m) if m != 0.0 => Computed::Value(sd / m * 100.0),
            _ => Computed::Undefined(InsufficientDataError::ZeroBaseline {
                metric: metric.to_string(),
            }),
        };
        Some(Self {
            metric: metric.to_string(),
            display_name: display_name(catalog, metric),
            range,
            coefficient_of_variation,
            level: DisparityLevel::of(range),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalInsights {
    pub state: String,
    pub county: Option<String>,
    pub year: i32,
    pub total_tracts: usize,
    pub composite_average: Computed<f64>,
    pub pillars: Vec<PillarSummary>,
    /// Largest range first
    pub top_disparities: Vec<Disparity>,
    pub tracts_needing_attention: usize,
    pub high_performing_tracts: usize,
    pub key_insights: Vec<String>,
}

impl RegionalInsights {
    pub fn build(
        catalog: &MetricCatalog,
        state: &str,
        county: Option<&str>,
        year: i32,
        records: &[&TractRecord],
    ) -> Self {
        let pillars = vec![
            PillarSummary::compute("Place", PLACE_METRIC, records),
            PillarSummary::compute("Economy", ECONOMY_METRIC, records),
            PillarSummary::compute("Community", COMMUNITY_METRIC, records),
        ];

        let mut disparities: Vec<Disparity> = KEY_EQUITY_METRICS
            .iter()
            .filter(|m| **m != COMPOSITE_METRIC)
            .filter_map(|m| Disparity::compute(catalog, m, records))
            .collect();
        disparities.sort_by(|a, b| b.range.total_cmp(&a.range));
        disparities.truncate(TOP_DISPARITIES);

        let composite = MetricSample::collect(records.iter().copied(), COMPOSITE_METRIC).values;
        let composite_average = stats::mean(&composite);
        let needing_attention = composite.iter().filter(|v| **v < BASELINE_SCORE).count();
        let high_performing = composite.iter().filter(|v| **v >= HIGH_PERFORMING_SCORE).count();

        let mut key_insights = Vec::new();
        if let Some(avg) = composite_average.get() {
            key_insights.push(if avg >= STRONG_PILLAR_AVERAGE {
                format!("Region shows strong inclusive growth with an average IGS of {avg:.1}")
            } else if avg >= BASELINE_SCORE {
                format!("Region has moderate inclusive growth (IGS {avg:.1}) with potential for improvement")
            } else {
                format!("Region shows below-baseline inclusive growth (IGS {avg:.1}); investment opportunities exist")
            });
        }
        if let Some(top) = disparities.first() {
            key_insights.push(format!(
                "Largest disparity in {} (gap of {:.1} points)",
                top.display_name, top.range
            ));
        }
        if needing_attention > 0 {
            let pct = needing_attention as f64 / records.len() as f64 * 100.0;
            key_insights.push(format!(
                "{needing_attention} tracts ({pct:.0}%) have an IGS below 50 and need targeted support"
            ));
        }
        if high_performing > 0 {
            key_insights.push(format!(
                "{high_performing} high-performing tracts (IGS of 70 or more) can serve as models for improvement"
            ));
        }

        Self {
            state: state.to_string(),
            county: county.map(str::to_string),
            year,
            total_tracts: records.len(),
            composite_average,
            pillars,
            top_disparities: disparities,
            tracts_needing_attention: needing_attention,
            high_performing_tracts: high_performing,
            key_insights,
        }
    }
}
