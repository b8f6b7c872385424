//! Pull request importer
//!
//! Mirrors pull requests and their commits from the hosting API into the
//! local store. Re-running is safe: known pull requests are refreshed and
//! their commit flags are left alone.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_batcher::config::{AppConfig, DEFAULT_CONFIG_FILE};
use merge_batcher::database::Database;
use merge_batcher::github::GitHubClient;
use merge_batcher::import::Importer;

#[derive(Parser)]
#[command(name = "import-pulls")]
#[command(about = "Import pull requests and their commits into the merge database")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Pull request state to import (open, closed, all)
    #[arg(short, long, default_value = "all")]
    state: String,

    /// Project to import from; defaults to github.upstream_project
    #[arg(short, long)]
    project: Option<String>,

    /// Seconds to wait after each pull request
    #[arg(long, default_value_t = 1)]
    pause_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merge_batcher=info".into()),
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

    let Some(project) = cli
        .project
        .clone()
        .or_else(|| config.github.upstream_project.clone())
    else {
        error!("No project given and github.upstream_project is not set");
        std::process::exit(1);
    };

    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;
    let github = GitHubClient::new(&config.github.api_url, &config.github.token)?;

    let summary = Importer::new(github, database, &project)
        .with_pause(Duration::from_secs(cli.pause_secs))
        .import_all(&cli.state)
        .await?;

    println!(
        "{}: {} pull requests seen, {} new, {} updated, {} skipped, {} commits recorded",
        project, summary.seen, summary.created, summary.updated, summary.skipped, summary.commits
    );
    Ok(())
}
