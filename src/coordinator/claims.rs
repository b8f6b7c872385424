//! Build-claim state machine: `unclaimed -> claimed -> (success | failed)`.
//!
//! Claims are two-phase. The conditional store update records a tentative
//! claim, the host is then asked to assign the pull request, and the claim is
//! reverted if that call fails.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::database::models::{ClaimUpdate, PullRequest};
use crate::database::queries::{ClaimableFilter, Queries};
use crate::database::Database;
use crate::error::MergerError;
use crate::github::GitHubClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSettings {
    pub project: String,
    pub base_ref: String,
    pub milestone: Option<String>,
    pub assignee: String,
    pub lease_timeout: Option<Duration>,
}

impl ClaimSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, MergerError> {
        let coordinator = config.coordinator()?;
        Ok(Self {
            project: coordinator.project.clone(),
            base_ref: coordinator.base_ref.clone(),
            milestone: coordinator.milestone.clone(),
            assignee: config.claim_assignee(),
            lease_timeout: coordinator
                .lease_timeout_secs
                .map(|secs| Duration::seconds(secs as i64)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult {
    Success,
    AlreadyClaimed,
    HostingFailed,
}

impl ClaimResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimResult::Success => "success",
            ClaimResult::AlreadyClaimed => "already claimed",
            ClaimResult::HostingFailed => "failed to call Github",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildVerdict {
    Success { artifact: String },
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeResult {
    Success,
    NotClaimedByCaller,
}

impl OutcomeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeResult::Success => "success",
            OutcomeResult::NotClaimedByCaller => "not claimed by caller",
        }
    }
}

#[derive(Clone)]
pub struct ClaimCoordinator {
    database: Database,
    github: GitHubClient,
    settings: Arc<ClaimSettings>,
}

impl ClaimCoordinator {
    pub fn new(database: Database, github: GitHubClient, settings: ClaimSettings) -> Self {
        Self {
            database,
            github,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ClaimSettings {
        &self.settings
    }

    pub async fn list_open(&self) -> Result<Vec<PullRequest>, MergerError> {
        Ok(Queries::list_open_pull_requests(self.database.pool(), &self.settings.project).await?)
    }

    /// Pull requests a worker may claim right now, including those whose lease
    /// has run out. Nothing is written.
    pub async fn list_claimable(&self) -> Result<Vec<PullRequest>, MergerError> {
        let filter = ClaimableFilter {
            project: &self.settings.project,
            base_ref: &self.settings.base_ref,
            milestone: self.settings.milestone.as_deref(),
            stale_before: self.stale_before(),
        };
        Ok(Queries::list_claimable(self.database.pool(), &filter).await?)
    }

    pub async fn get(&self, pr_id: i64) -> Result<Option<PullRequest>, MergerError> {
        Ok(Queries::get_pull_request(self.database.pool(), pr_id).await?)
    }

    /// Release claims older than the lease timeout. A no-op without a timeout.
    pub async fn expire_stale(&self) -> Result<u64, MergerError> {
        match self.stale_before() {
            Some(cutoff) => self.database.expire_stale_claims(cutoff).await,
            None => Ok(0),
        }
    }

    fn stale_before(&self) -> Option<DateTime<Utc>> {
        self.settings.lease_timeout.map(|timeout| Utc::now() - timeout)
    }

    pub async fn claim(&self, pr: &PullRequest, node: &str) -> Result<ClaimResult, MergerError> {
        let update = self
            .database
            .claim_build_with_lease(pr.id, node, Utc::now(), self.stale_before())
            .await?;
        if update == ClaimUpdate::AlreadyClaimed {
            return Ok(ClaimResult::AlreadyClaimed);
        }

        let assigned = match pr.number {
            Some(number) => {
                self.github
                    .assign_issue(&pr.project, number, &self.settings.assignee)
                    .await
            }
            None => Err(MergerError::HostingApi {
                status: None,
                message: format!("Pull request {} has no number", pr.id),
            }),
        };

        if let Err(e) = assigned {
            error!(
                "Failed to assign pull request {} on the host, reverting claim by {}: {}",
                pr.id, node, e
            );
            self.database.release_claim(pr.id, node).await?;
            return Ok(ClaimResult::HostingFailed);
        }

        if !self
            .database
            .confirm_claim(pr.id, node, &self.settings.assignee)
            .await?
        {
            warn!("Claim on pull request {} by {} vanished before confirmation", pr.id, node);
        }
        info!("Pull request {} assigned to {} for {}", pr.id, self.settings.assignee, node);
        Ok(ClaimResult::Success)
    }

    /// Record the outcome of a build. Only the worker holding the claim may report.
    pub async fn report_outcome(
        &self,
        pr_id: i64,
        node: &str,
        verdict: BuildVerdict,
    ) -> Result<OutcomeResult, MergerError> {
        let recorded = match &verdict {
            BuildVerdict::Success { artifact } => {
                self.database.record_build_success(pr_id, node, artifact).await?
            }
            BuildVerdict::Failure => self.database.release_claim(pr_id, node).await?,
        };

        if !recorded {
            warn!("{} reported on pull request {} without holding the claim", node, pr_id);
            return Ok(OutcomeResult::NotClaimedByCaller);
        }
        info!("{} reported {:?} for pull request {}", node, verdict, pr_id);
        Ok(OutcomeResult::Success)
    }
}
