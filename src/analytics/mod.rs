//! Read-only query surface over the current tract snapshot.
//!
//! Every operation clones the snapshot `Arc` once and answers entirely from
//! that view, so a concurrent ingestion swap is never observed mid-query.

pub mod cache;
pub mod correlation;
pub mod filter;
pub mod gap;
pub mod grouping;
pub mod insights;
pub mod rankings;
pub mod stats;
pub mod trend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::common::error::{IgsError, Result};
use crate::domain::{MetricCatalog, MetricDefinition, TractId, TractRecord, METRIC_CATALOG};
use crate::observability::metrics::query as query_metrics;
use crate::pipeline::storage::{SnapshotStore, TractSnapshot};

pub use cache::QueryCache;
pub use correlation::{Correlation, CorrelationStrength};
pub use filter::{MetricThreshold, Page, TractFilter};
pub use gap::{GapEntry, GapReport, PeerGroup};
pub use grouping::{GroupBy, GroupKey, MetricSample, PairedSample};
pub use insights::{
    ChangeTrend, CountyOpportunity, Disparity, DisparityLevel, Grade, GradedScore, IndicatorReading,
    OpportunityCategory, OpportunityIndex, PillarSummary, RegionalInsights, Scorecard, StateSummary,
    YearOverYear,
};
pub use rankings::{RankedTract, Rankings};
pub use stats::{Aggregate, GroupAggregate};
pub use trend::{Observation, Trend, TrendDirection, TrendPoint};

/// Upper bound on the top/bottom list length of a ranking
pub const MAX_RANKING_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractPage {
    /// Matches before pagination
    pub total: usize,
    pub records: Vec<TractRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub tract_id: TractId,
    pub state: String,
    pub county: String,
    pub year: i32,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValuePage {
    pub metric: String,
    pub total: usize,
    pub values: Vec<MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub version: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub source_sha256: Option<String>,
    pub record_count: usize,
    pub tract_count: usize,
    pub states: Vec<String>,
    pub years: Vec<i32>,
}

pub struct AnalyticsEngine {
    store: Arc<SnapshotStore>,
    catalog: Arc<MetricCatalog>,
    cache: Arc<QueryCache>,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<SnapshotStore>, cache: Arc<QueryCache>) -> Self {
        Self::with_catalog(store, cache, Arc::new(METRIC_CATALOG.clone()))
    }

    pub fn with_catalog(store: Arc<SnapshotStore>, cache: Arc<QueryCache>, catalog: Arc<MetricCatalog>) -> Self {
        Self { store, catalog, cache }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Run `compute` against the current snapshot through the query cache.
    /// The cache key combines the snapshot version with `operation` and the
    /// serialized parameters.
    fn run<P, T, F>(&self, operation: &'static str, params: &P, compute: F) -> Result<T>
    where
        P: Serialize,
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&TractSnapshot) -> Result<T>,
    {
        let started = Instant::now();
        query_metrics::request(operation);
        let snapshot = self.store.current();
        let key = format!("{operation}:{}", serde_json::to_string(params)?);
        let result = self
            .cache
            .get_or_compute(snapshot.version, &key, || compute(&snapshot))
            .map(|value| value.as_ref().clone());

        query_metrics::duration(operation, started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            query_metrics::error(operation, e.code());
            debug!("{} failed: {}", operation, e);
        }
        result
    }

    fn metric_name(&self, metric: &str) -> Result<String> {
        Ok(self.catalog.require(metric)?.name.clone())
    }

    /// Records matching `filter` in `(tract_id, year)` order, paginated
    #[instrument(skip(self))]
    pub fn find_tracts(&self, filter: &TractFilter, page: Page) -> Result<TractPage> {
        let filter = filter.resolve(&self.catalog)?;
        self.run("find_tracts", &(&filter, &page), |snapshot| {
            let hits = filter.select(snapshot);
            let total = hits.len();
            let records = page.apply(hits).into_iter().cloned().collect();
            Ok(TractPage { total, records })
        })
    }

    /// One tract-year, or every year of the tract chronologically when
    /// `year` is `None`
    #[instrument(skip(self))]
    pub fn lookup(&self, tract_id: &str, year: Option<i32>) -> Result<Vec<TractRecord>> {
        let id = TractId::parse(tract_id)?;
        self.run("lookup", &(&id, year), |snapshot| {
            let records: Vec<TractRecord> = match year {
                Some(y) => snapshot.get(&id, y).into_iter().cloned().collect(),
                None => snapshot.tract_history(&id).into_iter().cloned().collect(),
            };
            if records.is_empty() {
                return Err(IgsError::NotFound {
                    tract_id: id.to_string(),
                    year,
                });
            }
            Ok(records)
        })
    }

    #[instrument(skip(self))]
    pub fn aggregate(&self, metric: &str, filter: &TractFilter) -> Result<Aggregate> {
        let metric = self.metric_name(metric)?;
        let filter = filter.resolve(&self.catalog)?;
        self.run("aggregate", &(&metric, &filter), |snapshot| {
            let sample = MetricSample::collect(filter.select(snapshot), &metric);
            Ok(Aggregate::from_sample(&metric, &sample))
        })
    }

    #[instrument(skip(self))]
    pub fn aggregate_by(&self, metric: &str, filter: &TractFilter, by: GroupBy) -> Result<Vec<GroupAggregate>> {
        let metric = self.metric_name(metric)?;
        let filter = filter.resolve(&self.catalog)?;
        self.run("aggregate_by", &(&metric, &filter, by), |snapshot| {
            let groups = grouping::group_records(filter.select(snapshot), by);
            Ok(groups
                .into_iter()
                .map(|(group, members)| {
                    let sample = MetricSample::collect(members, &metric);
                    GroupAggregate {
                        group,
                        aggregate: Aggregate::from_sample(&metric, &sample),
                    }
                })
                .collect())
        })
    }

    #[instrument(skip(self))]
    pub fn correlate(&self, metric_a: &str, metric_b: &str, filter: &TractFilter) -> Result<Correlation> {
        let metric_a = self.metric_name(metric_a)?;
        let metric_b = self.metric_name(metric_b)?;
        let filter = filter.resolve(&self.catalog)?;
        self.run("correlate", &(&metric_a, &metric_b, &filter), |snapshot| {
            let sample = PairedSample::collect(filter.select(snapshot), &metric_a, &metric_b);
            Ok(Correlation::from_sample(&metric_a, &metric_b, &sample))
        })
    }

    /// Gap of one tract-year against its peers for each metric. An empty
    /// metric list compares the key equity metrics.
    #[instrument(skip(self))]
    pub fn gap(&self, tract_id: &str, year: i32, metrics: &[String], peers: &PeerGroup) -> Result<GapReport> {
        let id = TractId::parse(tract_id)?;
        let metrics = if metrics.is_empty() {
            insights::default_year_over_year_metrics()
        } else {
            metrics
                .iter()
                .map(|m| self.metric_name(m))
                .collect::<Result<Vec<_>>>()?
        };
        let peers = match peers {
            PeerGroup::Filter { filter } => PeerGroup::Filter {
                filter: filter.resolve(&self.catalog)?,
            },
            other => other.clone(),
        };

        self.run("gap", &(&id, year, &metrics, &peers), |snapshot| {
            let target = snapshot.get(&id, year).ok_or_else(|| IgsError::NotFound {
                tract_id: id.to_string(),
                year: Some(year),
            })?;
            let members = peers.members(snapshot, target);
            let entries = metrics
                .iter()
                .map(|metric| GapEntry::compute(metric, target, &members))
                .collect();
            Ok(GapReport {
                tract_id: id.clone(),
                year,
                state: target.state.clone(),
                county: target.county.clone(),
                peer_group: peers.clone(),
                peer_records: members.len(),
                entries,
            })
        })
    }

    #[instrument(skip(self))]
    pub fn trend(&self, tract_id: &str, metric: &str) -> Result<Trend> {
        let id = TractId::parse(tract_id)?;
        let metric = self.metric_name(metric)?;
        self.run("trend", &(&id, &metric), |snapshot| {
            Trend::build(&metric, &snapshot.tract_history(&id)).ok_or_else(|| IgsError::NotFound {
                tract_id: id.to_string(),
                year: None,
            })
        })
    }

    #[instrument(skip(self))]
    pub fn rankings(&self, metric: &str, filter: &TractFilter, limit: usize) -> Result<Rankings> {
        if limit == 0 || limit > MAX_RANKING_LIMIT {
            return Err(IgsError::InvalidQuery(format!(
                "ranking limit must be between 1 and {MAX_RANKING_LIMIT}"
            )));
        }
        let metric = self.metric_name(metric)?;
        let filter = filter.resolve(&self.catalog)?;
        self.run("rankings", &(&metric, &filter, limit), |snapshot| {
            Ok(Rankings::build(&metric, &filter.select(snapshot), limit))
        })
    }

    pub fn states(&self) -> Result<Vec<StateSummary>> {
        self.run("states", &(), |snapshot| Ok(insights::summarize_states(snapshot.records())))
    }

    /// State-level average change between two years. An empty metric list
    /// compares the key equity metrics.
    #[instrument(skip(self))]
    pub fn year_over_year(
        &self,
        state: &str,
        year_start: i32,
        year_end: i32,
        metrics: &[String],
    ) -> Result<Vec<YearOverYear>> {
        let metrics = if metrics.is_empty() {
            insights::default_year_over_year_metrics()
        } else {
            metrics
                .iter()
                .map(|m| self.metric_name(m))
                .collect::<Result<Vec<_>>>()?
        };
        let state = state.trim().to_string();
        self.run("year_over_year", &(&state, year_start, year_end, &metrics), |snapshot| {
            let start = TractFilter::new().state(&state).year(year_start).select(snapshot);
            let end = TractFilter::new().state(&state).year(year_end).select(snapshot);
            Ok(metrics
                .iter()
                .map(|m| YearOverYear::compute(m, year_start, year_end, &start, &end))
                .collect())
        })
    }

    /// County opportunity ranking for `year`, or the latest loaded year
    #[instrument(skip(self))]
    pub fn opportunity_index(&self, year: Option<i32>) -> Result<OpportunityIndex> {
        self.run("opportunity_index", &year, |snapshot| {
            let year = year.or_else(|| snapshot.years().last());
            let records = match year {
                Some(y) => snapshot.in_year(y),
                None => Vec::new(),
            };
            Ok(OpportunityIndex::build(year, &records))
        })
    }

    /// Scorecard of one tract for `year`, or its latest year
    #[instrument(skip(self))]
    pub fn scorecard(&self, tract_id: &str, year: Option<i32>) -> Result<Scorecard> {
        let id = TractId::parse(tract_id)?;
        self.run("scorecard", &(&id, year), |snapshot| {
            let record = match year {
                Some(y) => snapshot.get(&id, y),
                None => snapshot.tract_history(&id).last().copied(),
            }
            .ok_or_else(|| IgsError::NotFound {
                tract_id: id.to_string(),
                year,
            })?;
            let state_records: Vec<&TractRecord> = snapshot
                .in_state(&record.state)
                .into_iter()
                .filter(|r| r.year == record.year)
                .collect();
            Ok(Scorecard::build(record, &state_records))
        })
    }

    /// Insights for a state (optionally one county) in `year`, or the latest
    /// loaded year
    #[instrument(skip(self))]
    pub fn regional_insights(&self, state: &str, county: Option<&str>, year: Option<i32>) -> Result<RegionalInsights> {
        let state = state.trim().to_string();
        if state.is_empty() {
            return Err(IgsError::InvalidQuery("state is required".to_string()));
        }
        let county = county.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
        self.run("regional_insights", &(&state, &county, year), |snapshot| {
            let year = year.or_else(|| snapshot.years().last()).unwrap_or_default();
            let mut filter = TractFilter::new().state(&state).year(year);
            if let Some(c) = &county {
                filter = filter.county(c);
            }
            let records = filter.select(snapshot);
            Ok(RegionalInsights::build(
                &self.catalog,
                &state,
                county.as_deref(),
                year,
                &records,
            ))
        })
    }

    /// One metric's value on every matching record; absent values stay absent
    #[instrument(skip(self))]
    pub fn metric_values(&self, metric: &str, filter: &TractFilter, page: Page) -> Result<MetricValuePage> {
        let metric = self.metric_name(metric)?;
        let filter = filter.resolve(&self.catalog)?;
        self.run("metric_values", &(&metric, &filter, &page), |snapshot| {
            let hits = filter.select(snapshot);
            let total = hits.len();
            let values = page
                .apply(hits)
                .into_iter()
                .map(|r| MetricValue {
                    tract_id: r.tract_id.clone(),
                    state: r.state.clone(),
                    county: r.county.clone(),
                    year: r.year,
                    value: r.metric(&metric),
                })
                .collect();
            Ok(MetricValuePage {
                metric: metric.clone(),
                total,
                values,
            })
        })
    }

    pub fn metric_definitions(&self) -> Vec<MetricDefinition> {
        self.catalog.iter().cloned().collect()
    }

    pub fn status(&self) -> StoreStatus {
        let snapshot = self.store.current();
        StoreStatus {
            version: snapshot.version,
            loaded_at: snapshot.loaded_at,
            source_sha256: snapshot.source_sha256.clone(),
            record_count: snapshot.len(),
            tract_count: snapshot.tract_count(),
            states: snapshot.states().map(str::to_string).collect(),
            years: snapshot.years().collect(),
        }
    }
}
