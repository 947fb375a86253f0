use crate::analytics::{AnalyticsEngine, Page, PeerGroup};
use crate::graphql::schema::GraphQLContext;
use crate::graphql::types::{
    filter_from, AggregateResult, CorrelationResult, GapReportResult, GroupAggregateResult,
    GroupByInput, LoadReportResult, MetricDefinitionResult, MetricValuePageResult,
    OpportunityIndexResult, PeerGroupInput, RankingsResult, RegionalInsightsResult, ScorecardResult,
    StateCount, StoreStatusResult, Tract, TractFilterInput, TractPageResult, TrendResult,
    YearOverYearResult,
};
use async_graphql::{Context, ErrorExtensions, FieldResult, Object};

const DEFAULT_RANKING_LIMIT: usize = 10;

/// Root query object for GraphQL
pub struct Query;

fn engine<'a>(ctx: &Context<'a>) -> FieldResult<&'a AnalyticsEngine> {
    Ok(ctx.data::<GraphQLContext>()?.engine.as_ref())
}

#[Object]
impl Query {
    /// Records matching a filter, ordered by tract and year
    async fn tracts(
        &self,
        ctx: &Context<'_>,
        filter: Option<TractFilterInput>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> FieldResult<TractPageResult> {
        let page = Page::new(offset.unwrap_or(0), limit);
        match engine(ctx)?.find_tracts(&filter_from(filter), page) {
            Ok(found) => Ok(TractPageResult {
                total: found.total,
                records: found.records.into_iter().map(Tract::from).collect(),
            }),
            Err(e) => Err(e.extend()),
        }
    }

    /// One tract-year, or every year of the tract when `year` is omitted
    async fn tract(&self, ctx: &Context<'_>, tract_id: String, year: Option<i32>) -> FieldResult<Vec<Tract>> {
        engine(ctx)?
            .lookup(&tract_id, year)
            .map(|records| records.into_iter().map(Tract::from).collect())
            .map_err(|e| e.extend())
    }

    async fn aggregate(
        &self,
        ctx: &Context<'_>,
        metric: String,
        filter: Option<TractFilterInput>,
    ) -> FieldResult<AggregateResult> {
        engine(ctx)?
            .aggregate(&metric, &filter_from(filter))
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    /// Aggregate of a metric per state, county or year
    async fn aggregate_by(
        &self,
        ctx: &Context<'_>,
        metric: String,
        group_by: GroupByInput,
        filter: Option<TractFilterInput>,
    ) -> FieldResult<Vec<GroupAggregateResult>> {
        engine(ctx)?
            .aggregate_by(&metric, &filter_from(filter), group_by.into())
            .map(|groups| groups.into_iter().map(Into::into).collect())
            .map_err(|e| e.extend())
    }

    /// Pearson correlation over records where both metrics are present
    async fn correlation(
        &self,
        ctx: &Context<'_>,
        metric_a: String,
        metric_b: String,
        filter: Option<TractFilterInput>,
    ) -> FieldResult<CorrelationResult> {
        engine(ctx)?
            .correlate(&metric_a, &metric_b, &filter_from(filter))
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    /// Gap of one tract-year against its peers. `filter` is only used when
    /// `peerGroup` is `FILTER`.
    async fn gap(
        &self,
        ctx: &Context<'_>,
        tract_id: String,
        year: i32,
        metrics: Option<Vec<String>>,
        peer_group: Option<PeerGroupInput>,
        filter: Option<TractFilterInput>,
    ) -> FieldResult<GapReportResult> {
        let peers = match peer_group.unwrap_or_default() {
            PeerGroupInput::State => PeerGroup::State,
            PeerGroupInput::County => PeerGroup::County,
            PeerGroupInput::Filter => PeerGroup::Filter {
                filter: filter_from(filter),
            },
        };
        engine(ctx)?
            .gap(&tract_id, year, &metrics.unwrap_or_default(), &peers)
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    async fn trend(&self, ctx: &Context<'_>, tract_id: String, metric: String) -> FieldResult<TrendResult> {
        engine(ctx)?
            .trend(&tract_id, &metric)
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    /// Top and bottom tracts for a metric (limit 1-50, default 10)
    async fn rankings(
        &self,
        ctx: &Context<'_>,
        metric: String,
        filter: Option<TractFilterInput>,
        limit: Option<usize>,
    ) -> FieldResult<RankingsResult> {
        engine(ctx)?
            .rankings(&metric, &filter_from(filter), limit.unwrap_or(DEFAULT_RANKING_LIMIT))
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    async fn states(&self, ctx: &Context<'_>) -> FieldResult<Vec<StateCount>> {
        engine(ctx)?
            .states()
            .map(|states| states.into_iter().map(Into::into).collect())
            .map_err(|e| e.extend())
    }

    async fn year_over_year(
        &self,
        ctx: &Context<'_>,
        state: String,
        year_start: i32,
        year_end: i32,
        metrics: Option<Vec<String>>,
    ) -> FieldResult<Vec<YearOverYearResult>> {
        engine(ctx)?
            .year_over_year(&state, year_start, year_end, &metrics.unwrap_or_default())
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(|e| e.extend())
    }

    async fn opportunity_index(&self, ctx: &Context<'_>, year: Option<i32>) -> FieldResult<OpportunityIndexResult> {
        engine(ctx)?
            .opportunity_index(year)
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    async fn scorecard(&self, ctx: &Context<'_>, tract_id: String, year: Option<i32>) -> FieldResult<ScorecardResult> {
        engine(ctx)?
            .scorecard(&tract_id, year)
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    async fn regional_insights(
        &self,
        ctx: &Context<'_>,
        state: String,
        county: Option<String>,
        year: Option<i32>,
    ) -> FieldResult<RegionalInsightsResult> {
        engine(ctx)?
            .regional_insights(&state, county.as_deref(), year)
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    /// One metric's value on every matching record
    async fn metric_values(
        &self,
        ctx: &Context<'_>,
        metric: String,
        filter: Option<TractFilterInput>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> FieldResult<MetricValuePageResult> {
        let page = Page::new(offset.unwrap_or(0), limit);
        engine(ctx)?
            .metric_values(&metric, &filter_from(filter), page)
            .map(Into::into)
            .map_err(|e| e.extend())
    }

    /// Every metric the engine knows about
    async fn metrics(&self, ctx: &Context<'_>) -> FieldResult<Vec<MetricDefinitionResult>> {
        Ok(engine(ctx)?
            .metric_definitions()
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn status(&self, ctx: &Context<'_>) -> FieldResult<StoreStatusResult> {
        Ok(engine(ctx)?.status().into())
    }

    /// Report of the most recent successful load
    async fn last_load(&self, ctx: &Context<'_>) -> FieldResult<Option<LoadReportResult>> {
        let context = ctx.data::<GraphQLContext>()?;
        match context.ingest.last_report().await {
            Ok(report) => Ok(report.map(Into::into)),
            Err(e) => Err(e.extend()),
        }
    }
}
