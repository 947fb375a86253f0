use async_graphql::{InputObject, Object, SimpleObject};

use crate::analytics::{MetricThreshold, TractFilter};
use crate::domain::{OpportunityZone, TractRecord, METRIC_CATALOG};

/// GraphQL representation of one tract-year record
#[derive(Clone)]
pub struct Tract {
    pub inner: TractRecord,
}

impl From<TractRecord> for Tract {
    fn from(record: TractRecord) -> Self {
        Self { inner: record }
    }
}

/// A named metric value; `value` is null when the source marked it absent
#[derive(Clone, SimpleObject)]
pub struct MetricEntry {
    pub name: String,
    pub value: Option<f64>,
}

#[Object]
impl Tract {
    /// 11-digit census tract FIPS code
    async fn tract_id(&self) -> &str {
        self.inner.tract_id.as_str()
    }

    async fn year(&self) -> i32 {
        self.inner.year
    }

    async fn county(&self) -> &str {
        &self.inner.county
    }

    async fn state(&self) -> &str {
        &self.inner.state
    }

    /// "yes", "no" or "unknown"
    async fn is_opportunity_zone(&self) -> &str {
        self.inner.is_opportunity_zone.as_str()
    }

    /// Value of one metric; accepts any spelling the catalog resolves
    async fn metric(&self, name: String) -> Option<f64> {
        METRIC_CATALOG
            .resolve(&name)
            .and_then(|def| self.inner.metric(&def.name))
    }

    /// Every metric column of the record, absent ones included
    async fn metrics(&self) -> Vec<MetricEntry> {
        self.inner
            .metrics
            .iter()
            .map(|(name, value)| MetricEntry {
                name: name.clone(),
                value: *value,
            })
            .collect()
    }
}

#[derive(Clone, SimpleObject)]
pub struct TractPageResult {
    pub total: usize,
    pub records: Vec<Tract>,
}

#[derive(InputObject, Clone)]
pub struct ThresholdInput {
    pub metric: String,
    pub min: f64,
}

/// Conjunctive record filter; omitted fields do not constrain
#[derive(InputObject, Clone, Default)]
pub struct TractFilterInput {
    pub state: Option<String>,
    pub county: Option<String>,
    pub year: Option<i32>,
    pub thresholds: Option<Vec<ThresholdInput>>,
    /// "yes", "no" or "unknown"
    pub opportunity_zone: Option<String>,
}

impl From<TractFilterInput> for TractFilter {
    fn from(input: TractFilterInput) -> Self {
        TractFilter {
            state: input.state,
            county: input.county,
            year: input.year,
            thresholds: input
                .thresholds
                .unwrap_or_default()
                .into_iter()
                .map(|t| MetricThreshold {
                    metric: t.metric,
                    min: t.min,
                })
                .collect(),
            opportunity_zone: input.opportunity_zone.as_deref().map(OpportunityZone::from_cell),
        }
    }
}

pub fn filter_from(input: Option<TractFilterInput>) -> TractFilter {
    input.map(TractFilter::from).unwrap_or_default()
}
