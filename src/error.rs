use std::fmt;

use thiserror::Error;

impl From<sqlx::Error> for MergerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<git2::Error> for MergerError {
    fn from(err: git2::Error) -> Self {
        Self::Git(err.message().to_string())
    }
}

impl From<octocrab::Error> for MergerError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => Self::HostingApi {
                status: Some(source.status_code.as_u16()),
                message: source.message,
            },
            other => Self::HostingApi {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for MergerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Coordinator {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for MergerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum MergerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("GitHub API error{}: {message}", status_suffix(.status))]
    HostingApi { status: Option<u16>, message: String },

    #[error("Coordinator error{}: {message}", status_suffix(.status))]
    Coordinator { status: Option<u16>, message: String },

    #[error("Git error: {0}")]
    Git(String),

    #[error("Branch {0} already exists; a previous run did not clean up")]
    BranchCollision(String),

    #[error("Commit {sha} of pull request {pr_id} does not apply cleanly")]
    MergeConflict { pr_id: i64, sha: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Invalid commit id {0:?}: expected 40 hexadecimal characters")]
    InvalidCommitSha(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

/// Build pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStage {
    Setup,
    Compile,
    Test,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Setup => "setup",
            BuildStage::Compile => "compile",
            BuildStage::Test => "test",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single failed build command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub command: String,
    /// Exit code, or `None` if the command could not be started or was killed.
    pub status: Option<i32>,
    pub output: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "`{}` exited with status {}", self.command, code),
            None => write!(f, "`{}` did not run to completion", self.command),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Build setup failed: {0}")]
    Setup(StepFailure),

    #[error("Compilation failed: {0}")]
    Compile(StepFailure),

    #[error("Unit tests failed: {0}")]
    Test(StepFailure),
}

impl BuildError {
    pub fn new(stage: BuildStage, failure: StepFailure) -> Self {
        match stage {
            BuildStage::Setup => Self::Setup(failure),
            BuildStage::Compile => Self::Compile(failure),
            BuildStage::Test => Self::Test(failure),
        }
    }

    pub fn stage(&self) -> BuildStage {
        match self {
            BuildError::Setup(_) => BuildStage::Setup,
            BuildError::Compile(_) => BuildStage::Compile,
            BuildError::Test(_) => BuildStage::Test,
        }
    }

    pub fn failure(&self) -> &StepFailure {
        match self {
            BuildError::Setup(f) | BuildError::Compile(f) | BuildError::Test(f) => f,
        }
    }

    /// Test failures may be flaky; setup and compile failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BuildError::Test(_))
    }
}

pub type MergerResult<T> = Result<T, MergerError>;
