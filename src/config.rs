use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::BuildStage;

mod loader;

pub use loader::DEFAULT_CONFIG_FILE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub repository: RepositoryConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub build: BuildConfig,
    pub coordinator: Option<CoordinatorConfig>,
    pub worker: Option<WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Working tree of the downstream clone. Owned exclusively by one pipeline run.
    pub path: PathBuf,
    /// Downstream branch batches are built on and raised against.
    pub base_branch: String,
    /// When set, batches start from `refs/remotes/{base_remote}/{base_branch}`.
    pub base_remote: Option<String>,
    /// Local branch checked out between evaluations. Defaults to `base_branch`.
    pub safe_branch: Option<String>,
    #[serde(default = "default_push_remote")]
    pub push_remote: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    pub committer: CommitterConfig,
}

impl RepositoryConfig {
    /// Revision the ephemeral branches are created from.
    pub fn base_ref(&self) -> String {
        match &self.base_remote {
            Some(remote) => format!("refs/remotes/{}/{}", remote, self.base_branch),
            None => format!("refs/heads/{}", self.base_branch),
        }
    }

    pub fn safe_branch(&self) -> &str {
        self.safe_branch.as_deref().unwrap_or(&self.base_branch)
    }
}

/// Service identity recorded as committer on every replayed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterConfig {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: String,
    /// Owner of the fork the batch branches are pushed to.
    pub username: String,
    /// Project (owner/repo) batches are raised against.
    pub downstream_project: String,
    /// Project (owner/repo) pull requests are imported from.
    pub upstream_project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Pause after each published batch, to stay inside the host's rate limits.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStepConfig {
    pub stage: BuildStage,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BuildStepConfig {
    pub fn new(stage: BuildStage, program: &str, args: &[&str]) -> Self {
        Self {
            stage,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_build_steps")]
    pub steps: Vec<BuildStepConfig>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            steps: default_build_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: HttpAuthConfig,
    /// Project whose pull requests are offered to workers.
    pub project: String,
    /// Base ref a pull request must target to be claimable.
    pub base_ref: String,
    pub milestone: Option<String>,
    /// Login assigned on the host when a claim succeeds. Defaults to `github.username`.
    pub assignee: Option<String>,
    /// Claims older than this without an artifact are released. `None` keeps claims forever.
    pub lease_timeout_secs: Option<u64>,
    #[serde(default = "default_lease_sweep_secs")]
    pub lease_sweep_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpAuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub coordinator_url: String,
    pub auth: HttpAuthConfig,
    pub node_name: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub artifact_dir: PathBuf,
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<PathBuf>,
    #[serde(default = "default_fetch_remote")]
    pub fetch_remote: String,
}

fn default_database_url() -> String {
    "sqlite://merger.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_push_remote() -> String {
    "origin".to_string()
}

fn default_branch_prefix() -> String {
    "upstream".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_batch_size() -> usize {
    4
}

fn default_cooldown_secs() -> u64 {
    60 * 60
}

fn default_build_steps() -> Vec<BuildStepConfig> {
    vec![
        BuildStepConfig::new(BuildStage::Setup, "./autogen.sh", &[]),
        BuildStepConfig::new(BuildStage::Setup, "./configure", &[]),
        BuildStepConfig::new(BuildStage::Compile, "make", &["clean"]),
        BuildStepConfig::new(BuildStage::Compile, "make", &[]),
        BuildStepConfig::new(BuildStage::Test, "make", &["check"]),
    ]
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_lease_sweep_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_artifact_prefix() -> String {
    "builds".to_string()
}

fn default_artifacts() -> Vec<PathBuf> {
    vec![
        PathBuf::from("src/dogecoind"),
        PathBuf::from("src/dogecoin-cli"),
        PathBuf::from("src/dogecoin-tx"),
    ]
}

fn default_fetch_remote() -> String {
    "upstream".to_string()
}
