//! Build worker
//!
//! Polls the coordinator for pull requests ready to build, claims one, builds
//! it in the configured clone and reports the result.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_batcher::config::{AppConfig, DEFAULT_CONFIG_FILE};
use merge_batcher::worker::BuildWorker;

#[derive(Parser)]
#[command(name = "build-worker")]
#[command(about = "Claim and build pull requests offered by the coordinator")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Build at most one pull request, then exit
    #[arg(long)]
    once: bool,
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

    let worker = BuildWorker::from_config(&config)?;
    if cli.once {
        match worker.run_once().await? {
            Some(outcome) => info!("{:?}", outcome),
            None => info!("Nothing to build"),
        }
        return Ok(());
    }

    worker.run().await?;
    Ok(())
}
