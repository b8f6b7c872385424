use std::path::{Path, PathBuf};

use git2::{Repository, Signature};
use tracing::info;

use crate::build::BuildValidator;
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::MergerError;
use crate::git::PushCredentials;
use crate::github::GitHubClient;

/// Everything one pipeline run needs, built once and passed down explicitly.
pub struct Session {
    pub config: AppConfig,
    pub database: Database,
    pub repository: Repository,
    pub github: GitHubClient,
    pub validator: BuildValidator,
    committer: Signature<'static>,
    workdir: PathBuf,
}

impl Session {
    /// Connect to the store and the hosting API described by `config` and open
    /// the downstream clone.
    pub async fn open(config: AppConfig) -> Result<Self, MergerError> {
        let database =
            Database::new(&config.database.url, config.database.max_connections).await?;
        database.run_migrations().await?;
        let github = GitHubClient::new(&config.github.api_url, &config.github.token)?;
        Self::new(config, database, github)
    }

    pub fn new(
        config: AppConfig,
        database: Database,
        github: GitHubClient,
    ) -> Result<Self, MergerError> {
        let repository = Repository::open(&config.repository.path).map_err(|e| {
            MergerError::Config(format!(
                "Cannot open repository {}: {}",
                config.repository.path.display(),
                e.message()
            ))
        })?;

        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                MergerError::Config(format!(
                    "Repository {} has no working tree",
                    config.repository.path.display()
                ))
            })?;

        let base_ref = config.repository.base_ref();
        if repository.revparse_single(&base_ref).is_err() {
            return Err(MergerError::Config(format!(
                "Could not find base branch {}",
                base_ref
            )));
        }

        let committer = Signature::now(
            &config.repository.committer.name,
            &config.repository.committer.email,
        )?;
        let validator = BuildValidator::new(config.build.steps.clone());

        info!(
            "Session opened on {} (base {}, committer {} <{}>)",
            workdir.display(),
            base_ref,
            config.repository.committer.name,
            config.repository.committer.email
        );

        Ok(Self {
            config,
            database,
            repository,
            github,
            validator,
            committer,
            workdir,
        })
    }

    /// Service identity for replayed commits. The picker restamps the time on
    /// each commit it creates.
    pub fn committer(&self) -> Signature<'static> {
        self.committer.clone()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Token authentication for pushes over HTTPS.
    pub fn push_credentials(&self) -> PushCredentials {
        PushCredentials {
            username: self.config.github.token.clone(),
            password: "x-oauth-basic".to_string(),
        }
    }
}
