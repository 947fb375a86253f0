//! GraphQL shapes of analytics results.
//!
//! Every statistic is exposed as a [`ComputedValue`] so clients can tell a
//! computed zero from a value that could not be computed.

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};

use crate::analytics::{
    Aggregate, Correlation, CountyOpportunity, Disparity, GapEntry, GapReport, GradedScore,
    GroupAggregate, GroupBy, IndicatorReading, MetricValuePage, Observation, OpportunityIndex, PillarSummary,
    RankedTract, Rankings, RegionalInsights, Scorecard, StateSummary, StoreStatus, Trend, TrendPoint,
    YearOverYear,
};
use crate::domain::{Computed, MetricDefinition};
use crate::pipeline::report::LoadReport;

fn label<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
pub enum GroupByInput {
    State,
    County,
    Year,
}

impl From<GroupByInput> for GroupBy {
    fn from(input: GroupByInput) -> Self {
        match input {
            GroupByInput::State => GroupBy::State,
            GroupByInput::County => GroupBy::County,
            GroupByInput::Year => GroupBy::Year,
        }
    }
}

/// Peer group for gap analysis. `FILTER` uses the query's filter argument.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Default)]
pub enum PeerGroupInput {
    #[default]
    State,
    County,
    Filter,
}

#[derive(Clone, SimpleObject)]
pub struct ComputedValue {
    pub value: Option<f64>,
    pub defined: bool,
    /// Why the value is undefined
    pub reason: Option<String>,
}

impl From<&Computed<f64>> for ComputedValue {
    fn from(computed: &Computed<f64>) -> Self {
        Self {
            value: computed.get(),
            defined: computed.is_defined(),
            reason: computed.reason().map(|r| r.to_string()),
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct AggregateResult {
    pub metric: String,
    pub count: usize,
    pub absent: usize,
    pub mean: ComputedValue,
    pub median: ComputedValue,
    pub min: ComputedValue,
    pub max: ComputedValue,
    pub std_dev: ComputedValue,
}

impl From<Aggregate> for AggregateResult {
    fn from(a: Aggregate) -> Self {
        Self {
            count: a.count,
            absent: a.absent,
            mean: (&a.mean).into(),
            median: (&a.median).into(),
            min: (&a.min).into(),
            max: (&a.max).into(),
            std_dev: (&a.std_dev).into(),
            metric: a.metric,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct GroupAggregateResult {
    pub group: String,
    pub aggregate: AggregateResult,
}

impl From<GroupAggregate> for GroupAggregateResult {
    fn from(g: GroupAggregate) -> Self {
        Self {
            group: g.group.to_string(),
            aggregate: g.aggregate.into(),
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct CorrelationResult {
    pub metric_a: String,
    pub metric_b: String,
    pub sample_size: usize,
    pub excluded: usize,
    pub coefficient: ComputedValue,
    pub strength: Option<String>,
}

impl From<Correlation> for CorrelationResult {
    fn from(c: Correlation) -> Self {
        Self {
            sample_size: c.sample_size,
            excluded: c.excluded,
            coefficient: (&c.coefficient).into(),
            strength: c.strength.as_ref().map(label),
            metric_a: c.metric_a,
            metric_b: c.metric_b,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct GapEntryResult {
    pub metric: String,
    pub tract_value: Option<f64>,
    pub peer_average: ComputedValue,
    pub peer_count: usize,
    pub gap: ComputedValue,
    pub relative_gap: ComputedValue,
}

impl From<GapEntry> for GapEntryResult {
    fn from(e: GapEntry) -> Self {
        Self {
            tract_value: e.tract_value,
            peer_average: (&e.peer_average).into(),
            peer_count: e.peer_count,
            gap: (&e.gap).into(),
            relative_gap: (&e.relative_gap).into(),
            metric: e.metric,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct GapReportResult {
    pub tract_id: String,
    pub year: i32,
    pub state: String,
    pub county: String,
    pub peer_records: usize,
    pub entries: Vec<GapEntryResult>,
}

impl From<GapReport> for GapReportResult {
    fn from(r: GapReport) -> Self {
        Self {
            tract_id: r.tract_id.to_string(),
            year: r.year,
            state: r.state,
            county: r.county,
            peer_records: r.peer_records,
            entries: r.entries.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
pub enum ObservationKind {
    Value,
    Absent,
    NoRecord,
}

#[derive(Clone, SimpleObject)]
pub struct TrendPointResult {
    pub year: i32,
    pub kind: ObservationKind,
    pub value: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
}

impl From<TrendPoint> for TrendPointResult {
    fn from(p: TrendPoint) -> Self {
        let kind = match p.observation {
            Observation::Value(_) => ObservationKind::Value,
            Observation::Absent => ObservationKind::Absent,
            Observation::NoRecord => ObservationKind::NoRecord,
        };
        Self {
            year: p.year,
            kind,
            value: p.observation.value(),
            change: p.change,
            change_pct: p.change_pct,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct TrendResult {
    pub tract_id: String,
    pub state: String,
    pub county: String,
    pub metric: String,
    pub points: Vec<TrendPointResult>,
    pub overall_change: Option<f64>,
    pub overall_change_pct: Option<f64>,
    pub avg_annual_change: Option<f64>,
    pub direction: String,
}

impl From<Trend> for TrendResult {
    fn from(t: Trend) -> Self {
        Self {
            tract_id: t.tract_id.to_string(),
            direction: label(&t.direction),
            state: t.state,
            county: t.county,
            metric: t.metric,
            points: t.points.into_iter().map(Into::into).collect(),
            overall_change: t.overall_change,
            overall_change_pct: t.overall_change_pct,
            avg_annual_change: t.avg_annual_change,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct RankedTractResult {
    pub rank: usize,
    pub tract_id: String,
    pub year: i32,
    pub state: String,
    pub county: String,
    pub value: f64,
    pub percentile: f64,
}

impl From<RankedTract> for RankedTractResult {
    fn from(r: RankedTract) -> Self {
        Self {
            rank: r.rank,
            tract_id: r.tract_id.to_string(),
            year: r.year,
            state: r.state,
            county: r.county,
            value: r.value,
            percentile: r.percentile,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct RankingsResult {
    pub metric: String,
    pub total: usize,
    pub unranked: usize,
    pub top: Vec<RankedTractResult>,
    pub bottom: Vec<RankedTractResult>,
}

impl From<Rankings> for RankingsResult {
    fn from(r: Rankings) -> Self {
        Self {
            metric: r.metric,
            total: r.total,
            unranked: r.unranked,
            top: r.top.into_iter().map(Into::into).collect(),
            bottom: r.bottom.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct StateCount {
    pub state: String,
    pub tract_count: usize,
}

impl From<StateSummary> for StateCount {
    fn from(s: StateSummary) -> Self {
        Self {
            state: s.state,
            tract_count: s.tract_count,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct YearOverYearResult {
    pub metric: String,
    pub year_start: i32,
    pub year_end: i32,
    pub start_average: ComputedValue,
    pub end_average: ComputedValue,
    pub absolute_change: ComputedValue,
    pub percent_change: ComputedValue,
    pub trend: String,
}

impl From<YearOverYear> for YearOverYearResult {
    fn from(y: YearOverYear) -> Self {
        Self {
            year_start: y.year_start,
            year_end: y.year_end,
            start_average: (&y.start_average).into(),
            end_average: (&y.end_average).into(),
            absolute_change: (&y.absolute_change).into(),
            percent_change: (&y.percent_change).into(),
            trend: label(&y.trend),
            metric: y.metric,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct MetricAverage {
    pub metric: String,
    pub average: Option<f64>,
}

#[derive(Clone, SimpleObject)]
pub struct CountyOpportunityResult {
    pub rank: usize,
    pub state: String,
    pub county: String,
    pub score: f64,
    pub category: String,
    pub tract_count: usize,
    pub metric_averages: Vec<MetricAverage>,
}

impl From<CountyOpportunity> for CountyOpportunityResult {
    fn from(c: CountyOpportunity) -> Self {
        Self {
            rank: c.rank,
            score: c.score,
            category: label(&c.category),
            tract_count: c.tract_count,
            metric_averages: c
                .metric_averages
                .into_iter()
                .map(|(metric, average)| MetricAverage { metric, average })
                .collect(),
            state: c.state,
            county: c.county,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct OpportunityIndexResult {
    pub year: Option<i32>,
    pub counties: Vec<CountyOpportunityResult>,
}

impl From<OpportunityIndex> for OpportunityIndexResult {
    fn from(o: OpportunityIndex) -> Self {
        Self {
            year: o.year,
            counties: o.counties.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct GradedScoreResult {
    pub metric: String,
    pub score: Option<f64>,
    pub grade: String,
}

impl From<GradedScore> for GradedScoreResult {
    fn from(g: GradedScore) -> Self {
        Self {
            grade: label(&g.grade),
            metric: g.metric,
            score: g.score,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct IndicatorReadingResult {
    pub metric: String,
    pub label: String,
    pub value: f64,
}

impl From<IndicatorReading> for IndicatorReadingResult {
    fn from(r: IndicatorReading) -> Self {
        Self {
            metric: r.metric,
            label: r.label,
            value: r.value,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct ScorecardResult {
    pub tract_id: String,
    pub year: i32,
    pub state: String,
    pub county: String,
    pub overall: GradedScoreResult,
    pub place: GradedScoreResult,
    pub economy: GradedScoreResult,
    pub community: GradedScoreResult,
    pub strengths: Vec<IndicatorReadingResult>,
    pub improvement_areas: Vec<IndicatorReadingResult>,
    pub state_average: ComputedValue,
    pub vs_state_average: ComputedValue,
    pub state_percentile: ComputedValue,
}

impl From<Scorecard> for ScorecardResult {
    fn from(s: Scorecard) -> Self {
        Self {
            tract_id: s.tract_id.to_string(),
            year: s.year,
            state_average: (&s.state_average).into(),
            vs_state_average: (&s.vs_state_average).into(),
            state_percentile: (&s.state_percentile).into(),
            state: s.state,
            county: s.county,
            overall: s.overall.into(),
            place: s.place.into(),
            economy: s.economy.into(),
            community: s.community.into(),
            strengths: s.strengths.into_iter().map(Into::into).collect(),
            improvement_areas: s.improvement_areas.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct PillarSummaryResult {
    pub pillar: String,
    pub metric: String,
    pub average: ComputedValue,
    pub min: ComputedValue,
    pub max: ComputedValue,
    pub at_or_above_baseline: usize,
    pub below_baseline: usize,
    pub insight: String,
}

impl From<PillarSummary> for PillarSummaryResult {
    fn from(p: PillarSummary) -> Self {
        Self {
            average: (&p.average).into(),
            min: (&p.min).into(),
            max: (&p.max).into(),
            pillar: p.pillar,
            metric: p.metric,
            at_or_above_baseline: p.at_or_above_baseline,
            below_baseline: p.below_baseline,
            insight: p.insight,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct DisparityResult {
    pub metric: String,
    pub display_name: String,
    pub range: f64,
    pub coefficient_of_variation: ComputedValue,
    pub level: String,
    pub interpretation: String,
}

impl From<Disparity> for DisparityResult {
    fn from(d: Disparity) -> Self {
        Self {
            coefficient_of_variation: (&d.coefficient_of_variation).into(),
            level: label(&d.level),
            interpretation: d.level.interpretation().to_string(),
            metric: d.metric,
            display_name: d.display_name,
            range: d.range,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct RegionalInsightsResult {
    pub state: String,
    pub county: Option<String>,
    pub year: i32,
    pub total_tracts: usize,
    pub composite_average: ComputedValue,
    pub pillars: Vec<PillarSummaryResult>,
    pub top_disparities: Vec<DisparityResult>,
    pub tracts_needing_attention: usize,
    pub high_performing_tracts: usize,
    pub key_insights: Vec<String>,
}

impl From<RegionalInsights> for RegionalInsightsResult {
    fn from(r: RegionalInsights) -> Self {
        Self {
            composite_average: (&r.composite_average).into(),
            state: r.state,
            county: r.county,
            year: r.year,
            total_tracts: r.total_tracts,
            pillars: r.pillars.into_iter().map(Into::into).collect(),
            top_disparities: r.top_disparities.into_iter().map(Into::into).collect(),
            tracts_needing_attention: r.tracts_needing_attention,
            high_performing_tracts: r.high_performing_tracts,
            key_insights: r.key_insights,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct MetricValueResult {
    pub tract_id: String,
    pub state: String,
    pub county: String,
    pub year: i32,
    pub value: Option<f64>,
}

#[derive(Clone, SimpleObject)]
pub struct MetricValuePageResult {
    pub metric: String,
    pub total: usize,
    pub values: Vec<MetricValueResult>,
}

impl From<MetricValuePage> for MetricValuePageResult {
    fn from(p: MetricValuePage) -> Self {
        Self {
            metric: p.metric,
            total: p.total,
            values: p
                .values
                .into_iter()
                .map(|v| MetricValueResult {
                    tract_id: v.tract_id.to_string(),
                    state: v.state,
                    county: v.county,
                    year: v.year,
                    value: v.value,
                })
                .collect(),
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct MetricDefinitionResult {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub kind: String,
    pub valid_min: Option<f64>,
    pub valid_max: Option<f64>,
}

impl From<MetricDefinition> for MetricDefinitionResult {
    fn from(d: MetricDefinition) -> Self {
        Self {
            category: label(&d.category),
            kind: label(&d.kind),
            valid_min: d.valid_range.map(|(lo, _)| lo),
            valid_max: d.valid_range.map(|(_, hi)| hi),
            name: d.name,
            display_name: d.display_name,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct StoreStatusResult {
    pub version: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub source_sha256: Option<String>,
    pub record_count: usize,
    pub tract_count: usize,
    pub states: Vec<String>,
    pub years: Vec<i32>,
}

impl From<StoreStatus> for StoreStatusResult {
    fn from(s: StoreStatus) -> Self {
        Self {
            version: s.version,
            loaded_at: s.loaded_at,
            source_sha256: s.source_sha256,
            record_count: s.record_count,
            tract_count: s.tract_count,
            states: s.states,
            years: s.years,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct RejectionCount {
    pub reason: String,
    pub count: u64,
}

/// Summary of an ingestion run
#[derive(Clone, SimpleObject)]
pub struct LoadReportResult {
    pub run_id: String,
    pub source_path: Option<String>,
    pub source_sha256: String,
    pub rows_read: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub records_stored: u64,
    pub rejections: Vec<RejectionCount>,
    pub load_version: Option<u64>,
}

impl From<LoadReport> for LoadReportResult {
    fn from(r: LoadReport) -> Self {
        Self {
            run_id: r.run_id.to_string(),
            source_path: r.source_path,
            source_sha256: r.source_sha256,
            rows_read: r.rows_read,
            rows_loaded: r.rows_loaded,
            rows_rejected: r.rows_rejected,
            records_stored: r.records_stored,
            rejections: r
                .rejection_summary
                .into_iter()
                .map(|(reason, count)| RejectionCount { reason, count })
                .collect(),
            load_version: r.load_version,
        }
    }
}
