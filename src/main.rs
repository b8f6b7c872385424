use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_batcher::config::{AppConfig, DEFAULT_CONFIG_FILE};
use merge_batcher::coordinator::{self, ClaimCoordinator, ClaimSettings};
use merge_batcher::database::Database;
use merge_batcher::github::GitHubClient;

#[derive(Parser)]
#[command(name = "merge-batcher")]
#[command(about = "Build-claim coordinator for upstream merge batches")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merge_batcher=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting merge-batcher coordinator");
    let cli = Cli::parse();

    // Load configuration
    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let settings = ClaimSettings::from_config(&config)?;
    let coordinator_config = config.coordinator()?.clone();
    info!("Configuration loaded");

    // Initialize database
    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;
    info!("Database ready at {}", config.database.url);

    let github = GitHubClient::new(&config.github.api_url, &config.github.token)?;
    let claims = ClaimCoordinator::new(database, github, settings);

    // Lease expiry task
    if coordinator_config.lease_timeout_secs.is_some() {
        let sweeper = claims.clone();
        let sweep_interval = Duration::from_secs(coordinator_config.lease_sweep_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                if let Err(e) = sweeper.expire_stale().await {
                    error!("Failed to expire stale claims: {}", e);
                }
            }
        });
        info!("Claim lease sweeper started");
    }

    let app = coordinator::router(claims, coordinator_config.auth.clone());

    // Start server
    let addr: SocketAddr = coordinator_config.bind.parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
