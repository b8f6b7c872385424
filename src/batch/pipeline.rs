//! The merge-batch pipeline: select, replay, build, publish.
//!
//! Each candidate is first evaluated on its own `{prefix}-pr-{id}` branch. Up
//! to `batch.size` viable pull requests are then replayed together onto a
//! `{prefix}-batch-{timestamp}-{n}` branch and raised as one pull request.
//! Everything runs sequentially on the session's working tree.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::cherry_pick::CherryPicker;
use super::publisher::{PublishedBatch, Publisher};
use super::selector::select_candidates;
use crate::database::queries::{PendingPullRequest, Queries};
use crate::error::{BuildStage, MergerError};
use crate::git::RepositoryExt;
use crate::session::Session;

/// Why a pull request was left out of this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Conflict { sha: String },
    Build { stage: BuildStage },
    BranchCollision { branch: String },
    Git { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Conflict { sha } => write!(f, "conflict applying {}", sha),
            SkipReason::Build { stage } => write!(f, "{} failure", stage),
            SkipReason::BranchCollision { branch } => {
                write!(f, "branch {} already exists", branch)
            }
            SkipReason::Git { message } => write!(f, "git error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPullRequest {
    pub pr_id: i64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub batches: Vec<PublishedBatch>,
    /// Pull requests that applied and built. Those that later conflicted with
    /// other members of their batch are moved to `skipped`.
    pub validated: Vec<i64>,
    pub skipped: Vec<SkippedPullRequest>,
}

impl RunReport {
    fn skip(&mut self, pr_id: i64, reason: SkipReason) {
        self.validated.retain(|id| *id != pr_id);
        self.skipped.push(SkippedPullRequest { pr_id, reason });
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} batch(es) published, {} pull request(s) validated, {} skipped",
            self.batches.len(),
            self.validated.len(),
            self.skipped.len()
        )?;
        for batch in &self.batches {
            writeln!(
                f,
                "  raised #{} ({}) from {}: {:?}",
                batch.raised_pr_number,
                batch.html_url.as_deref().unwrap_or("no url"),
                batch.branch,
                batch.pr_ids
            )?;
        }
        for skipped in &self.skipped {
            writeln!(f, "  skipped {}: {}", skipped.pr_id, skipped.reason)?;
        }
        Ok(())
    }
}

pub struct BatchPipeline<'s> {
    session: &'s Session,
    dry_run: bool,
}

impl<'s> BatchPipeline<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            dry_run: false,
        }
    }

    /// Evaluate candidates without creating batch branches or publishing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> Result<RunReport, MergerError> {
        let result = self.run_batches().await;
        let restore = self.return_to_safe_branch();
        let report = result?;
        restore?;

        info!(
            "Run complete: {} batches published, {} pull requests skipped",
            report.batches.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn run_batches(&self) -> Result<RunReport, MergerError> {
        let batch_size = self.session.config.batch.size;
        let cooldown = Duration::from_secs(self.session.config.batch.cooldown_secs);

        let mut report = RunReport::default();
        let mut viable: Vec<PendingPullRequest> = Vec::new();
        let mut batch_index = 0;

        for candidate in select_candidates(&self.session.database).await? {
            match self.evaluate(candidate.pr_id).await? {
                Some(reason) => report.skip(candidate.pr_id, reason),
                None => {
                    report.validated.push(candidate.pr_id);
                    viable.push(candidate);
                }
            }

            if viable.len() == batch_size && !self.dry_run {
                batch_index += 1;
                let batch = std::mem::take(&mut viable);
                let published = self.publish_batch(&batch, batch_index, &mut report).await?;
                if published && !cooldown.is_zero() {
                    info!("Cooling down for {}s before the next batch", cooldown.as_secs());
                    tokio::time::sleep(cooldown).await;
                }
            }
        }

        if !viable.is_empty() && !self.dry_run {
            batch_index += 1;
            self.publish_batch(&viable, batch_index, &mut report).await?;
        }

        if self.dry_run {
            info!("Dry run: {:?} would be batched", report.validated);
        }
        Ok(report)
    }

    /// Apply and build one pull request on its own branch. Returns why it is
    /// not viable, or `None` if it is.
    async fn evaluate(&self, pr_id: i64) -> Result<Option<SkipReason>, MergerError> {
        let repository = &self.session.repository;
        let branch = format!("{}-pr-{}", self.session.config.repository.branch_prefix, pr_id);

        match repository.create_branch_from(&branch, &self.session.config.repository.base_ref()) {
            Ok(_) => {}
            Err(MergerError::BranchCollision(name)) => {
                error!(
                    "Branch {} already exists, skipping pull request {}; clean up the previous run",
                    name, pr_id
                );
                return Ok(Some(SkipReason::BranchCollision { branch: name }));
            }
            Err(e) => return Err(e),
        }

        let verdict = self.evaluate_on_branch(&branch, pr_id).await;

        self.return_to_safe_branch()?;
        repository.delete_branch(&branch)?;
        verdict
    }

    async fn evaluate_on_branch(
        &self,
        branch: &str,
        pr_id: i64,
    ) -> Result<Option<SkipReason>, MergerError> {
        let commits = Queries::pending_commits(self.session.database.pool(), pr_id).await?;
        let picker = CherryPicker::new(&self.session.repository, self.session.committer());

        let applied = picker
            .apply_pull_request(branch, pr_id, &commits)
            .and_then(|result| result.into_applied(pr_id));
        match applied {
            Ok(_) => {}
            Err(MergerError::MergeConflict { sha, .. }) => {
                warn!("Skipping pull request {}: commit {} does not apply", pr_id, sha);
                return Ok(Some(SkipReason::Conflict { sha }));
            }
            Err(e @ (MergerError::Git(_) | MergerError::InvalidCommitSha(_))) => {
                warn!("Skipping pull request {}: {}", pr_id, e);
                return Ok(Some(SkipReason::Git {
                    message: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        }

        info!("Attempting build of pull request {}", pr_id);
        match self.session.validator.validate(self.session.workdir()) {
            Ok(()) => Ok(None),
            Err(MergerError::Build(e)) => {
                warn!("Skipping pull request {}: {}", pr_id, e);
                Ok(Some(SkipReason::Build { stage: e.stage() }))
            }
            Err(e) => Err(e),
        }
    }

    /// Replay `batch` onto a fresh batch branch and raise it. Returns whether a
    /// pull request was raised.
    async fn publish_batch(
        &self,
        batch: &[PendingPullRequest],
        batch_index: usize,
        report: &mut RunReport,
    ) -> Result<bool, MergerError> {
        let repository = &self.session.repository;
        let now = Utc::now();
        let branch = format!(
            "{}-batch-{}-{}",
            self.session.config.repository.branch_prefix,
            now.format("%Y%m%d%H%M%S"),
            batch_index
        );
        repository.create_branch_from(&branch, &self.session.config.repository.base_ref())?;

        let mut pull_requests = Vec::with_capacity(batch.len());
        for pr in batch {
            let commits = Queries::pending_commits(self.session.database.pool(), pr.pr_id).await?;
            pull_requests.push((pr.pr_id, commits));
        }

        let picker = CherryPicker::new(repository, self.session.committer());
        let application = picker.apply_batch(&branch, &pull_requests)?;
        for (pr_id, sha) in application.conflicts {
            warn!(
                "Pull request {} conflicts with earlier members of {} at {}",
                pr_id, branch, sha
            );
            report.skip(pr_id, SkipReason::Conflict { sha });
        }

        let included: Vec<PendingPullRequest> = batch
            .iter()
            .filter(|pr| application.applied.contains(&pr.pr_id))
            .cloned()
            .collect();

        let published = !included.is_empty();
        if published {
            let batch = Publisher::new(self.session)
                .publish(&branch, &included, now)
                .await?;
            report.batches.push(batch);
        } else {
            warn!("Nothing in {} applied, not publishing", branch);
        }

        self.return_to_safe_branch()?;
        repository.delete_branch(&branch)?;
        Ok(published)
    }

    fn return_to_safe_branch(&self) -> Result<(), MergerError> {
        self.session
            .repository
            .checkout_branch(self.session.config.repository.safe_branch())
    }
}
