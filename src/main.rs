use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use igs_analytics::analytics::{GroupBy, Page, PeerGroup, TractFilter};
use igs_analytics::domain::OpportunityZone;
use igs_analytics::{logging, observability, server, AppConfig, AppServices};

#[derive(Parser)]
#[command(name = "igs")]
#[command(about = "Inclusive Growth Score census-tract ingestion and analytics")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a source file into the store, replacing the previous load
    Ingest {
        /// Source CSV; defaults to the configured source path
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Serve the GraphQL API over the persisted store
    Serve {
        /// Overrides the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show one tract-year, or every year of a tract
    Lookup {
        tract_id: String,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Aggregate statistics of a metric
    Stats {
        metric: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum)]
        group_by: Option<GroupByArg>,
    },
    /// Pearson correlation between two metrics
    Correlate {
        metric_a: String,
        metric_b: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Gap of a tract against its peers
    Gap {
        tract_id: String,
        #[arg(long)]
        year: i32,
        /// Comma-separated metrics; defaults to the key equity metrics
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        #[arg(long, value_enum, default_value = "state")]
        peers: PeerArg,
    },
    /// A tract's metric across all loaded years
    Trend { tract_id: String, metric: String },
    /// Top and bottom tracts for a metric
    Rankings {
        metric: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List the matching records
    Find {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    county: Option<String>,
    #[arg(long)]
    year: Option<i32>,
    /// Metric threshold as `metric=min`; repeatable
    #[arg(long = "min", value_parser = parse_threshold)]
    thresholds: Vec<(String, f64)>,
    /// yes, no or unknown
    #[arg(long)]
    opportunity_zone: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> TractFilter {
        let mut filter = TractFilter::new();
        filter.state = self.state.clone();
        filter.county = self.county.clone();
        filter.year = self.year;
        for (metric, min) in &self.thresholds {
            filter = filter.min(metric.as_str(), *min);
        }
        if let Some(zone) = &self.opportunity_zone {
            filter = filter.opportunity_zone(OpportunityZone::from_cell(zone));
        }
        filter
    }
}

fn parse_threshold(raw: &str) -> std::result::Result<(String, f64), String> {
    let (metric, min) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected metric=min, got '{raw}'"))?;
    let min = min
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid threshold '{min}': {e}"))?;
    Ok((metric.trim().to_string(), min))
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupByArg {
    State,
    County,
    Year,
}

impl From<GroupByArg> for GroupBy {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::State => GroupBy::State,
            GroupByArg::County => GroupBy::County,
            GroupByArg::Year => GroupBy::Year,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PeerArg {
    State,
    County,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Services with the snapshot hydrated from the database
async fn open_services(config: &AppConfig) -> Result<AppServices> {
    let services = AppServices::open(config)?;
    let version = services.ingest.restore_snapshot().await?;
    if services.engine.status().record_count == 0 {
        warn!(
            "Store at {} is empty (version {}); run `igs ingest` first",
            config.storage.database_path.display(),
            version
        );
    }
    Ok(services)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logging::init_logging();
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;

    match cli.command {
        Commands::Ingest { path } => {
            let services = AppServices::open(&config)?;
            let path = path.unwrap_or_else(|| config.ingest.source_path.clone());
            let report = services.ingest.ingest_path(&path).await?;
            print_json(&report)?;
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if config.server.metrics_enabled {
                if let Err(e) = observability::init() {
                    warn!("Metrics disabled: {}", e);
                }
            }
            let services = open_services(&config).await?;
            info!("Serving store version {}", services.engine.status().version);
            server::start_server(services, &config.server, config.ingest.source_path.clone()).await?;
        }
        Commands::Lookup { tract_id, year } => {
            let services = open_services(&config).await?;
            print_json(&services.engine.lookup(&tract_id, year)?)?;
        }
        Commands::Stats {
            metric,
            filter,
            group_by,
        } => {
            let services = open_services(&config).await?;
            let filter = filter.to_filter();
            match group_by {
                Some(by) => print_json(&services.engine.aggregate_by(&metric, &filter, by.into())?)?,
                None => print_json(&services.engine.aggregate(&metric, &filter)?)?,
            }
        }
        Commands::Correlate {
            metric_a,
            metric_b,
            filter,
        } => {
            let services = open_services(&config).await?;
            print_json(&services.engine.correlate(&metric_a, &metric_b, &filter.to_filter())?)?;
        }
        Commands::Gap {
            tract_id,
            year,
            metrics,
            peers,
        } => {
            let services = open_services(&config).await?;
            let peers = match peers {
                PeerArg::State => PeerGroup::State,
                PeerArg::County => PeerGroup::County,
            };
            print_json(&services.engine.gap(&tract_id, year, &metrics, &peers)?)?;
        }
        Commands::Trend { tract_id, metric } => {
            let services = open_services(&config).await?;
            print_json(&services.engine.trend(&tract_id, &metric)?)?;
        }
        Commands::Rankings {
            metric,
            filter,
            limit,
        } => {
            let services = open_services(&config).await?;
            print_json(&services.engine.rankings(&metric, &filter.to_filter(), limit)?)?;
        }
        Commands::Find {
            filter,
            limit,
            offset,
        } => {
            let services = open_services(&config).await?;
            print_json(&services.engine.find_tracts(&filter.to_filter(), Page::new(offset, limit))?)?;
        }
    }
    Ok(())
}
