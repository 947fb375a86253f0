use anyhow::Result;
use igs_analytics::analytics::{
    ChangeTrend, GroupBy, GroupKey, Grade, Observation, Page, PeerGroup, TractFilter, TrendDirection,
};
use igs_analytics::common::error::IgsError;
use igs_analytics::config::AppConfig;
use igs_analytics::domain::{Computed, InsufficientDataError};
use igs_analytics::pipeline::storage::InMemoryRepository;
use igs_analytics::AppServices;
use std::path::PathBuf;
use std::sync::Arc;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/resources/sample_igs.csv")
}

async fn loaded_services() -> Result<AppServices> {
    let services = AppServices::build(&AppConfig::default(), Arc::new(InMemoryRepository::new()));
    services.ingest.ingest_path(&sample_path()).await?;
    Ok(services)
}

fn approx(actual: &Computed<f64>, expected: f64) {
    let value = actual.get().expect("value should be defined");
    assert!((value - expected).abs() < 1e-9, "{value} != {expected}");
}

#[tokio::test]
async fn aggregate_over_a_year() -> Result<()> {
    let services = loaded_services().await?;
    let agg = services
        .engine
        .aggregate("Inclusive Growth Score", &TractFilter::new().year(2020))?;

    assert_eq!(agg.metric, "inclusive_growth_score");
    assert_eq!(agg.count, 6);
    assert_eq!(agg.absent, 0);
    approx(&agg.mean, 337.0 / 6.0);
    approx(&agg.median, 58.0);
    approx(&agg.min, 38.0);
    approx(&agg.max, 72.0);
    assert!(agg.std_dev.is_defined());
    Ok(())
}

#[tokio::test]
async fn single_value_aggregate_has_undefined_spread() -> Result<()> {
    let services = loaded_services().await?;
    let filter = TractFilter::new().county("fulton county").year(2020);
    let agg = services
        .engine
        .aggregate("minority_women_business_score", &filter)?;

    assert_eq!(agg.count, 1);
    assert_eq!(agg.absent, 1);
    approx(&agg.mean, 80.0);
    assert!(matches!(
        agg.std_dev,
        Computed::Undefined(InsufficientDataError::TooFewValues { available: 1, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn aggregate_by_state() -> Result<()> {
    let services = loaded_services().await?;
    let groups = services.engine.aggregate_by(
        "inclusive_growth_score",
        &TractFilter::new().year(2020),
        GroupBy::State,
    )?;

    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[0].group,
        GroupKey::State {
            state: "Georgia".into()
        }
    );
    approx(&groups[0].aggregate.mean, 52.5);
    approx(&groups[1].aggregate.mean, 63.5);
    Ok(())
}

#[tokio::test]
async fn correlation_with_one_complete_pair_is_insufficient() -> Result<()> {
    let services = loaded_services().await?;
    let corr = services.engine.correlate(
        "internet_access_score",
        "minority_women_owned_businesses_score",
        &TractFilter::new().county("Fulton County"),
    )?;

    assert_eq!(corr.sample_size, 1);
    assert_eq!(corr.excluded, 1);
    assert!(!corr.coefficient.is_defined());
    assert!(matches!(
        corr.coefficient.reason(),
        Some(InsufficientDataError::TooFewValues { .. })
    ));
    assert!(corr.strength.is_none());
    Ok(())
}

#[tokio::test]
async fn correlation_is_symmetric() -> Result<()> {
    let services = loaded_services().await?;
    let filter = TractFilter::new();
    let ab = services
        .engine
        .correlate("internet_access_score", "inclusive_growth_score", &filter)?;
    let ba = services
        .engine
        .correlate("inclusive_growth_score", "internet_access_score", &filter)?;

    assert_eq!(ab.coefficient, ba.coefficient);
    assert_eq!(ab.sample_size, 7);
    let r = ab.coefficient.get().unwrap();
    assert!((-1.0..=1.0).contains(&r));
    Ok(())
}

#[tokio::test]
async fn gap_returns_partial_results() -> Result<()> {
    let services = loaded_services().await?;
    let metrics = vec![
        "internet_access_score".to_string(),
        "minority_women_owned_businesses_score".to_string(),
    ];
    let report = services
        .engine
        .gap("13121000100", 2020, &metrics, &PeerGroup::County)?;

    assert_eq!(report.peer_records, 1);
    let internet = &report.entries[0];
    approx(&internet.peer_average, 85.0);
    approx(&internet.gap, 5.0);
    approx(&internet.relative_gap, 5.0 / 85.0);

    let mwob = &report.entries[1];
    assert_eq!(mwob.tract_value, Some(80.0));
    assert_eq!(mwob.peer_count, 0);
    assert!(matches!(
        mwob.gap,
        Computed::Undefined(InsufficientDataError::PeerAverageUndefined { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn gap_defaults_to_key_equity_metrics_within_state() -> Result<()> {
    let services = loaded_services().await?;
    let report = services
        .engine
        .gap("13089021415", 2020, &[], &PeerGroup::default())?;

    assert_eq!(report.peer_records, 3);
    assert_eq!(report.entries.len(), 6);
    assert_eq!(report.entries[0].metric, "inclusive_growth_score");
    approx(&report.entries[0].peer_average, (38.0 + 72.0 + 55.0) / 3.0);
    Ok(())
}

#[tokio::test]
async fn trend_across_years() -> Result<()> {
    let services = loaded_services().await?;
    let trend = services.engine.trend("13089021415", "igs")?;

    assert_eq!(trend.points.len(), 2);
    assert_eq!(trend.points[0].observation, Observation::Value(40.0));
    assert_eq!(trend.points[1].change, Some(5.0));
    assert_eq!(trend.overall_change, Some(5.0));
    assert_eq!(trend.direction, TrendDirection::Improving);
    Ok(())
}

#[tokio::test]
async fn rankings_top_and_bottom() -> Result<()> {
    let services = loaded_services().await?;
    let rankings = services
        .engine
        .rankings("inclusive_growth_score", &TractFilter::new().year(2020), 3)?;

    assert_eq!(rankings.total, 6);
    let top: Vec<&str> = rankings.top.iter().map(|r| r.tract_id.as_str()).collect();
    assert_eq!(top, vec!["13121000100", "48453000101", "48453000102"]);
    assert_eq!(rankings.top[0].rank, 1);
    assert_eq!(rankings.bottom[0].tract_id.as_str(), "13089021416");
    assert_eq!(rankings.bottom[0].rank, 6);

    let err = services
        .engine
        .rankings("inclusive_growth_score", &TractFilter::new(), 0)
        .unwrap_err();
    assert!(matches!(err, IgsError::InvalidQuery(_)));
    Ok(())
}

#[tokio::test]
async fn caller_errors() -> Result<()> {
    let services = loaded_services().await?;
    let engine = &services.engine;

    assert!(matches!(
        engine.aggregate("not_a_metric", &TractFilter::new()),
        Err(IgsError::UnknownMetric(_))
    ));
    assert!(matches!(
        engine.lookup("1308902141", None),
        Err(IgsError::InvalidTractId(_))
    ));
    assert!(matches!(
        engine.lookup("13089021415", Some(2017)),
        Err(IgsError::NotFound { year: Some(2017), .. })
    ));
    assert!(matches!(
        engine.aggregate("inclusive_growth_score", &TractFilter::new().min("bogus", 1.0)),
        Err(IgsError::UnknownMetric(_))
    ));
    Ok(())
}

#[tokio::test]
async fn filtered_lookup_paginates() -> Result<()> {
    let services = loaded_services().await?;
    let filter = TractFilter::new().state("georgia").min("inclusive_growth_score", 40.0);
    let page = services.engine.find_tracts(&filter, Page::new(1, Some(2)))?;

    assert_eq!(page.total, 4);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].tract_id.as_str(), "13089021415");
    assert_eq!(page.records[0].year, 2020);
    assert_eq!(page.records[1].tract_id.as_str(), "13121000100");
    Ok(())
}

#[tokio::test]
async fn metric_values_keep_absent_entries() -> Result<()> {
    let services = loaded_services().await?;
    let values = services.engine.metric_values(
        "minority_women_owned_businesses_score",
        &TractFilter::new().county("Fulton County"),
        Page::default(),
    )?;

    assert_eq!(values.total, 2);
    assert_eq!(values.values[0].value, Some(80.0));
    assert_eq!(values.values[1].value, None);
    Ok(())
}

#[tokio::test]
async fn state_level_insights() -> Result<()> {
    let services = loaded_services().await?;
    let engine = &services.engine;

    let states = engine.states()?;
    assert_eq!(states.len(), 2);
    assert_eq!((states[0].state.as_str(), states[0].tract_count), ("Georgia", 4));
    assert_eq!((states[1].state.as_str(), states[1].tract_count), ("Texas", 2));

    let yoy = engine.year_over_year("Georgia", 2019, 2020, &["igs".to_string()])?;
    approx(&yoy[0].absolute_change, 12.5);
    assert_eq!(yoy[0].trend, ChangeTrend::Improved);

    let index = engine.opportunity_index(None)?;
    assert_eq!(index.year, Some(2020));
    assert_eq!(index.counties.len(), 3);
    assert!(index
        .counties
        .windows(2)
        .all(|w| w[0].score >= w[1].score && w[0].rank + 1 == w[1].rank));

    let card = engine.scorecard("13121000100", None)?;
    assert_eq!(card.year, 2020);
    assert_eq!(card.overall.grade, Grade::B);

    let insights = engine.regional_insights("Georgia", None, Some(2020))?;
    assert_eq!(insights.total_tracts, 4);
    assert_eq!(insights.tracts_needing_attention, 2);
    assert_eq!(insights.high_performing_tracts, 1);
    assert!(!insights.key_insights.is_empty());

    let pillars: Vec<(&str, usize, usize)> = insights
        .pillars
        .iter()
        .map(|p| (p.pillar.as_str(), p.at_or_above_baseline, p.below_baseline))
        .collect();
    assert_eq!(
        pillars,
        vec![("Place", 3, 1), ("Economy", 2, 2), ("Community", 2, 2)]
    );
    let place = &insights.pillars[0];
    approx(&place.average, 58.0);
    approx(&place.min, 47.0);
    approx(&place.max, 75.0);
    let economy = &insights.pillars[1];
    approx(&economy.average, 52.5);
    approx(&economy.min, 40.0);
    approx(&economy.max, 70.0);
    let community = &insights.pillars[2];
    approx(&community.average, 49.0);
    approx(&community.min, 33.0);
    approx(&community.max, 71.0);
    assert_eq!(
        community.insight,
        "Community metrics indicate opportunity for intervention: 2/4 tracts below the baseline"
    );
    Ok(())
}

#[tokio::test]
async fn published_display_names_are_queryable() -> Result<()> {
    let services = loaded_services().await?;
    let engine = &services.engine;

    for def in engine.metric_definitions() {
        let agg = engine.aggregate(&def.display_name, &TractFilter::new())?;
        assert_eq!(agg.metric, def.name, "display name '{}'", def.display_name);
    }

    let place = engine.aggregate("Place (Overall)", &TractFilter::new().year(2020))?;
    assert_eq!(place.count, 6);
    Ok(())
}

#[tokio::test]
async fn readers_keep_their_snapshot_across_a_swap() -> Result<()> {
    let services = loaded_services().await?;
    let before = services.engine.store().current();
    let cached = services
        .engine
        .aggregate("inclusive_growth_score", &TractFilter::new())?;
    assert!(!services.engine.cache().is_empty());

    let replacement = "\
Census Tract FIPS code,County,State,Year,Inclusive Growth Score
13089021415,DeKalb County,Georgia,2021,90
48453000101,Travis County,Texas,2021,10
";
    services
        .ingest
        .ingest_bytes(replacement.as_bytes(), Some("replacement.csv"))
        .await?;

    assert_eq!(before.len(), 7);
    assert_eq!(before.version, 1);
    assert_eq!(services.engine.status().version, 2);
    assert_eq!(services.engine.status().record_count, 2);

    let fresh = services
        .engine
        .aggregate("inclusive_growth_score", &TractFilter::new())?;
    assert_eq!(cached.count, 7);
    assert_eq!(fresh.count, 2);
    approx(&fresh.mean, 50.0);
    Ok(())
}
