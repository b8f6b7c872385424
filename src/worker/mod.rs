//! Remote build worker: polls the coordinator, claims one pull request at a
//! time, builds it and reports the outcome.

pub mod artifacts;
pub mod client;

pub use artifacts::ArtifactStore;
pub use client::CoordinatorClient;

use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::Repository;
use tracing::{error, info, warn};

use crate::build::BuildValidator;
use crate::config::AppConfig;
use crate::error::{BuildStage, MergerError};
use crate::git::RepositoryExt;

/// What happened to a claimed pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Built { pr_id: i64, artifact: String },
    Failed { pr_id: i64, stage: BuildStage },
}

pub struct BuildWorker {
    client: CoordinatorClient,
    repository: Repository,
    workdir: PathBuf,
    validator: BuildValidator,
    store: ArtifactStore,
    artifacts: Vec<PathBuf>,
    fetch_remote: String,
    safe_branch: String,
    poll_interval: Duration,
}

impl BuildWorker {
    pub fn from_config(config: &AppConfig) -> Result<Self, MergerError> {
        let settings = config.worker()?;
        let repository = Repository::open(&config.repository.path)?;
        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                MergerError::Config(format!(
                    "Repository {} has no working tree",
                    config.repository.path.display()
                ))
            })?;

        Ok(Self {
            client: CoordinatorClient::from_config(settings),
            repository,
            workdir,
            validator: BuildValidator::new(config.build.steps.clone()),
            store: ArtifactStore::new(&settings.artifact_dir, &settings.artifact_prefix),
            artifacts: settings.artifacts.clone(),
            fetch_remote: settings.fetch_remote.clone(),
            safe_branch: config.repository.safe_branch().to_string(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
        })
    }

    /// Poll forever, sleeping whenever nothing is claimable.
    pub async fn run(&self) -> Result<(), MergerError> {
        loop {
            match self.run_once().await {
                Ok(Some(outcome)) => info!("Worker finished: {:?}", outcome),
                Ok(None) => {
                    info!(
                        "No pull requests ready to build, sleeping {}s",
                        self.poll_interval.as_secs()
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    error!("Build round failed: {}", e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claim and build a single pull request, if one is available.
    pub async fn run_once(&self) -> Result<Option<WorkerOutcome>, MergerError> {
        let Some(pr) = self.client.claim_next().await? else {
            return Ok(None);
        };
        let Some(number) = pr.number else {
            return Ok(None);
        };

        let built = self.build(number);
        let restored = self.repository.checkout_branch(&self.safe_branch);

        let outcome = match built {
            Ok(artifact) => {
                let result = self.client.report_success(pr.id, &artifact).await?;
                if !CoordinatorClient::is_success(&result) {
                    warn!("Coordinator refused success for {}: {}", pr.id, result);
                }
                WorkerOutcome::Built {
                    pr_id: pr.id,
                    artifact,
                }
            }
            Err(MergerError::Build(e)) => {
                warn!("Pull request {} (#{}) failed to build: {}", pr.id, number, e);
                if e.is_retryable() {
                    info!("Releasing {} so the test run can be retried elsewhere", pr.id);
                }
                self.client.report_failure(pr.id).await?;
                WorkerOutcome::Failed {
                    pr_id: pr.id,
                    stage: e.stage(),
                }
            }
            Err(e) => {
                self.client.report_failure(pr.id).await?;
                return Err(e);
            }
        };

        restored?;
        Ok(Some(outcome))
    }

    fn build(&self, number: i64) -> Result<String, MergerError> {
        let branch = format!("pr-{}", number);
        self.repository.fetch_refspec(
            &self.fetch_remote,
            &format!("+refs/pull/{}/head:refs/heads/{}", number, branch),
        )?;
        self.repository.checkout_branch(&branch)?;

        info!("Building #{} in {}", number, self.workdir.display());
        self.validator.validate(&self.workdir)?;
        self.store.store(number, &self.workdir, &self.artifacts)
    }
}
