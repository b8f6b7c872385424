//! Replays approved commits onto an ephemeral branch, one pull request at a time.
//!
//! A pull request either lands completely or not at all: on the first conflict
//! the branch is hard-reset to the tip it had before that pull request started.

use git2::{Oid, Repository, Signature};
use tracing::{debug, info, warn};

use crate::database::models::PullRequestCommit;
use crate::error::MergerError;
use crate::git::{parse_sha, PickOutcome, RepositoryExt};

/// Outcome of replaying one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickResult {
    /// Every commit applied. `commits` holds the new commit ids in replay order.
    Applied { tip: Oid, commits: Vec<Oid> },
    /// `sha` did not apply cleanly; the branch is back at its previous tip.
    Conflict { sha: String, paths: Vec<String> },
}

impl PickResult {
    /// New commit ids on success, `MergeConflict` otherwise.
    pub fn into_applied(self, pr_id: i64) -> Result<Vec<Oid>, MergerError> {
        match self {
            PickResult::Applied { commits, .. } => Ok(commits),
            PickResult::Conflict { sha, .. } => Err(MergerError::MergeConflict { pr_id, sha }),
        }
    }
}

/// Outcome of replaying several pull requests onto one branch.
#[derive(Debug, Clone, Default)]
pub struct BatchApplication {
    pub applied: Vec<i64>,
    /// Pull requests left out, with the sha that failed to apply.
    pub conflicts: Vec<(i64, String)>,
    pub tip: Option<Oid>,
}

/// Replays commits as `committer`. Only the name and email of the signature
/// are used; every new commit is stamped with the time it was made.
pub struct CherryPicker<'r> {
    repo: &'r Repository,
    committer: Signature<'static>,
}

impl<'r> CherryPicker<'r> {
    pub fn new(repo: &'r Repository, committer: Signature<'static>) -> Self {
        Self { repo, committer }
    }

    fn committer_now(&self) -> Result<Signature<'static>, MergerError> {
        let name = String::from_utf8_lossy(self.committer.name_bytes());
        let email = String::from_utf8_lossy(self.committer.email_bytes());
        Ok(Signature::now(&name, &email)?)
    }

    /// Replay the commits of `pr_id` onto `branch`, in ascending ordinality
    /// whatever order they are passed in.
    ///
    /// Conflicts are reported as [PickResult::Conflict]. Any other failure also
    /// restores the branch before the error is returned.
    pub fn apply_pull_request(
        &self,
        branch: &str,
        pr_id: i64,
        commits: &[PullRequestCommit],
    ) -> Result<PickResult, MergerError> {
        let mut ordered: Vec<&PullRequestCommit> = commits.iter().collect();
        ordered.sort_by_key(|c| c.ordinality);

        self.repo.checkout_branch(branch)?;
        let pre_tip = self.repo.branch_tip(branch)?;
        debug!(
            "Replaying {} commits of pull request {} onto {} at {}",
            ordered.len(),
            pr_id,
            branch,
            pre_tip
        );

        let result = self.replay(branch, pre_tip, &ordered);

        let restore = !matches!(result, Ok(PickResult::Applied { .. }));
        if restore {
            self.repo.reset_hard(pre_tip)?;
        }
        self.repo.clear_operation_state()?;

        match &result {
            Ok(PickResult::Applied { tip, commits }) => info!(
                "Pull request {} applied cleanly to {} ({} commits, tip {})",
                pr_id,
                branch,
                commits.len(),
                tip
            ),
            Ok(PickResult::Conflict { sha, paths }) => warn!(
                "Pull request {} conflicts at commit {} ({}); {} reset to {}",
                pr_id,
                sha,
                paths.join(", "),
                branch,
                pre_tip
            ),
            Err(e) => warn!(
                "Replaying pull request {} failed: {}; {} reset to {}",
                pr_id, e, branch, pre_tip
            ),
        }
        result
    }

    /// Replay several pull requests in the given order, chaining each onto the
    /// previous tip. A conflicting pull request is left out; the rest still apply.
    pub fn apply_batch(
        &self,
        branch: &str,
        pull_requests: &[(i64, Vec<PullRequestCommit>)],
    ) -> Result<BatchApplication, MergerError> {
        let mut application = BatchApplication::default();
        for (pr_id, commits) in pull_requests {
            match self.apply_pull_request(branch, *pr_id, commits)? {
                PickResult::Applied { tip, .. } => {
                    application.applied.push(*pr_id);
                    application.tip = Some(tip);
                }
                PickResult::Conflict { sha, .. } => {
                    application.conflicts.push((*pr_id, sha));
                }
            }
        }
        Ok(application)
    }

    fn replay(
        &self,
        branch: &str,
        pre_tip: Oid,
        commits: &[&PullRequestCommit],
    ) -> Result<PickResult, MergerError> {
        let mut parent = pre_tip;
        let mut created = Vec::with_capacity(commits.len());

        for commit in commits {
            let source = self.repo.find_commit(parse_sha(&commit.sha)?)?;

            match self.repo.cherry_pick_onto_head(&source)? {
                PickOutcome::Clean => {}
                PickOutcome::Conflicted { paths } => {
                    return Ok(PickResult::Conflict {
                        sha: commit.sha.clone(),
                        paths,
                    });
                }
            }

            let message = provenance_message(source.message().unwrap_or_default(), &commit.sha);
            let committer = self.committer_now()?;
            parent = self
                .repo
                .commit_index(branch, parent, &source, &committer, &message)?;
            self.repo.clear_operation_state()?;
            debug!("Replayed {} as {}", commit.sha, parent);
            created.push(parent);
        }

        Ok(PickResult::Applied {
            tip: parent,
            commits: created,
        })
    }
}

/// Source message followed by a trailer naming the upstream commit.
pub fn provenance_message(message: &str, sha: &str) -> String {
    format!(
        "{}\n\n(cherry picked from commit {})\n",
        message.trim_end(),
        sha
    )
}
