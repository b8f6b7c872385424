//! Mirrors pull requests and their commits from the hosting API into the store.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::queries::Queries;
use crate::database::Database;
use crate::error::MergerError;
use crate::github::types::PullRequest;
use crate::github::GitHubClient;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub seen: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub commits: u64,
}

pub struct Importer {
    github: GitHubClient,
    database: Database,
    project: String,
    pause: Duration,
}

impl Importer {
    pub fn new(github: GitHubClient, database: Database, project: &str) -> Self {
        Self {
            github,
            database,
            project: project.to_string(),
            pause: Duration::ZERO,
        }
    }

    /// Wait this long after each pull request, to stay under the API rate limit.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Import every pull request in `state` (`open`, `closed` or `all`), page by
    /// page until an empty page is returned.
    pub async fn import_all(&self, state: &str) -> Result<ImportSummary, MergerError> {
        let mut summary = ImportSummary::default();
        let mut page = 1;

        loop {
            let pulls = self
                .github
                .list_pull_requests(&self.project, state, page)
                .await?;
            if pulls.is_empty() {
                break;
            }
            for pr in pulls {
                self.import_one(pr, &mut summary).await?;
                if !self.pause.is_zero() {
                    tokio::time::sleep(self.pause).await;
                }
            }
            page += 1;
        }

        info!(
            "Imported {} pull requests from {}: {} new, {} updated, {} skipped, {} commits",
            summary.seen,
            self.project,
            summary.created,
            summary.updated,
            summary.skipped,
            summary.commits
        );
        Ok(summary)
    }

    async fn import_one(
        &self,
        pr: PullRequest,
        summary: &mut ImportSummary,
    ) -> Result<(), MergerError> {
        summary.seen += 1;
        if pr.user.is_none() {
            warn!("Skipping pull request #{} ({}): no user", pr.number, pr.id);
            summary.skipped += 1;
            return Ok(());
        }

        let known = Queries::get_pull_request(self.database.pool(), pr.id)
            .await?
            .is_some();
        let number = pr.number;
        let pr_id = pr.id;
        self.database
            .upsert_pull_request(&pr.into_record(&self.project))
            .await?;

        if known {
            summary.updated += 1;
            return Ok(());
        }

        let shas: Vec<String> = self
            .github
            .list_commits(&self.project, number)
            .await?
            .into_iter()
            .map(|c| c.sha)
            .collect();
        let inserted = self.database.insert_commits(pr_id, &shas).await?;
        debug!(
            "Recorded {} commits for new pull request #{} ({})",
            inserted, number, pr_id
        );
        summary.created += 1;
        summary.commits += inserted;
        Ok(())
    }
}
