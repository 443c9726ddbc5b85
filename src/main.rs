use anyhow::Result;
use clap::{Parser, Subcommand};
use owidlake::{
    config::{ConfigOverrides, PipelineConfig},
    fetch::HttpFeed,
    pipeline::Pipeline,
    snapshot::{Dataset, SnapshotDate},
    store::LocalBlobStore,
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Run one or all stages of the OWID emissions pipeline.
#[derive(Parser, Debug)]
#[command(name = "owidlake", version)]
struct Cli {
    /// Root of the local blob store (overrides LAKE_STORE_ROOT)
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Source CSV URL (overrides LAKE_SOURCE_URL)
    #[arg(long, global = true)]
    source_url: Option<String>,

    /// Measure gated in Silver and aggregated in Gold (overrides LAKE_PRIMARY_MEASURE)
    #[arg(long, global = true)]
    measure: Option<String>,

    /// Rank cutoff for the top-emitters report (overrides LAKE_TOP_N)
    #[arg(long, global = true)]
    top_n: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the source CSV into Bronze (default snapshot: today)
    Ingest {
        #[arg(long)]
        snapshot_date: Option<SnapshotDate>,
    },
    /// Bronze → Silver (default snapshot: latest Bronze)
    Silver {
        #[arg(long)]
        snapshot_date: Option<SnapshotDate>,
    },
    /// Silver → dim_country + fact_emissions (default snapshot: latest Silver)
    Gold {
        #[arg(long)]
        snapshot_date: Option<SnapshotDate>,
    },
    /// fact_emissions → aggregate reports (default snapshot: latest fact table)
    Aggregate {
        #[arg(long)]
        snapshot_date: Option<SnapshotDate>,
    },
    /// All stages in order (default snapshot: today)
    Run {
        #[arg(long)]
        snapshot_date: Option<SnapshotDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        error!(error = %format!("{:#}", e), "owidlake failed");
        return Err(e);
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let config = PipelineConfig::from_env(ConfigOverrides {
        store_root: cli.store_root,
        source_url: cli.source_url,
        primary_measure: cli.measure,
        top_n: cli.top_n,
    })?;
    info!(
        store_root = %config.store_root.display(),
        source_url = %config.source_url,
        measure = %config.primary_measure,
        top_n = config.top_n,
        "configuration"
    );

    let store = Arc::new(LocalBlobStore::new(config.store_root.clone()));
    let pipeline = Pipeline::new(store, config);

    match cli.command {
        Command::Ingest { snapshot_date } => {
            let feed = HttpFeed::new()?;
            let snapshot = snapshot_date.unwrap_or_else(SnapshotDate::today);
            print_json(&pipeline.ingest(&feed, snapshot).await?)
        }
        Command::Silver { snapshot_date } => {
            let snapshot = pipeline
                .resolve_snapshot(Dataset::BRONZE_OWID, snapshot_date)
                .await?;
            print_json(&pipeline.build_silver(snapshot).await?)
        }
        Command::Gold { snapshot_date } => {
            let snapshot = pipeline
                .resolve_snapshot(Dataset::SILVER_OWID, snapshot_date)
                .await?;
            print_json(&pipeline.build_gold(snapshot).await?)
        }
        Command::Aggregate { snapshot_date } => {
            let snapshot = pipeline
                .resolve_snapshot(Dataset::FACT_EMISSIONS, snapshot_date)
                .await?;
            print_json(&pipeline.build_aggregates(snapshot).await?)
        }
        Command::Run { snapshot_date } => {
            let feed = HttpFeed::new()?;
            let snapshot = snapshot_date.unwrap_or_else(SnapshotDate::today);
            print_json(&pipeline.run(&feed, snapshot).await?)
        }
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
