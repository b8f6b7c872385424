//! Batch merge tool
//!
//! Evaluates every approved upstream pull request against the downstream base
//! branch and raises the viable ones in batches.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_batcher::batch::BatchPipeline;
use merge_batcher::config::{AppConfig, DEFAULT_CONFIG_FILE};
use merge_batcher::session::Session;

#[derive(Parser)]
#[command(name = "batch-merge")]
#[command(about = "Replay approved upstream pull requests and raise them as batches")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Evaluate mergeability and builds without raising anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merge_batcher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let session = Session::open(config).await?;
    let report = BatchPipeline::new(&session).dry_run(cli.dry_run).run().await?;

    info!("{}", serde_json::to_string(&report)?);
    print!("{}", report);
    Ok(())
}
