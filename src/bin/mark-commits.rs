//! Commit marking tool
//!
//! Reads commit hashes, one per line, and flags them as approved for merging
//! or as already merged downstream.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_batcher::config::{AppConfig, DEFAULT_CONFIG_FILE};
use merge_batcher::database::Database;
use merge_batcher::git::parse_sha;

#[derive(Parser)]
#[command(name = "mark-commits")]
#[command(about = "Flag upstream commits for merging")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Approve commits for the next batch
    ToMerge {
        /// File with one commit hash per line
        file: PathBuf,
    },
    /// Record commits as already present downstream
    Merged {
        /// File with one commit hash per line
        file: PathBuf,
    },
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

    let file = match &cli.command {
        Commands::ToMerge { file } | Commands::Merged { file } => file,
    };
    let shas = read_shas(&fs::read_to_string(file)?);

    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;

    let updated = match cli.command {
        Commands::ToMerge { .. } => database.mark_commits_to_merge(&shas).await?,
        Commands::Merged { .. } => database.mark_commits_merged(&shas).await?,
    };
    println!("{} of {} commits updated", updated, shas.len());
    Ok(())
}

fn read_shas(contents: &str) -> Vec<String> {
    let mut shas = Vec::new();
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_sha(line) {
            Ok(_) => shas.push(line.to_lowercase()),
            Err(e) => warn!("Skipping line: {}", e),
        }
    }
    shas
}
