use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::database::queries::PendingPullRequest;
use crate::error::MergerError;
use crate::git::RepositoryExt;
use crate::github::types::CreatePullRequest;
use crate::session::Session;

/// A batch raised downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedBatch {
    pub branch: String,
    pub raised_pr_id: i64,
    pub raised_pr_number: i64,
    pub html_url: Option<String>,
    pub pr_ids: Vec<i64>,
    pub commits_marked: u64,
}

pub struct Publisher<'s> {
    session: &'s Session,
}

impl<'s> Publisher<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Push `branch`, raise it as a pull request against the base branch and
    /// record the result. A rejected push or API call is returned as an error
    /// and nothing is written to the store.
    pub async fn publish(
        &self,
        branch: &str,
        included: &[PendingPullRequest],
        now: DateTime<Utc>,
    ) -> Result<PublishedBatch, MergerError> {
        let config = &self.session.config;

        self.session.repository.push_branch(
            &config.repository.push_remote,
            branch,
            Some(&self.session.push_credentials()),
        )?;

        let titles: Vec<&str> = included.iter().map(|p| p.title.as_str()).collect();
        let request = CreatePullRequest {
            title: batch_title(now),
            body: batch_body(&titles),
            head: format!("{}:{}", config.github.username, branch),
            base: config.repository.base_branch.clone(),
        };
        let raised = self
            .session
            .github
            .create_pull_request(&config.github.downstream_project, &request)
            .await?;

        let raised_pr_id = raised.id;
        let raised_pr_number = raised.number;
        let html_url = raised.html_url.clone();

        let mut record = raised.into_record(&config.github.downstream_project);
        if record.user_login.is_none() {
            record.user_login = Some(config.github.username.clone());
        }

        let pr_ids: Vec<i64> = included.iter().map(|p| p.pr_id).collect();
        let commits_marked = self
            .session
            .database
            .record_published_batch(&record, &pr_ids)
            .await?;

        info!(
            "Published batch {} as pull request #{} containing {:?}",
            branch, raised_pr_number, pr_ids
        );

        Ok(PublishedBatch {
            branch: branch.to_string(),
            raised_pr_id,
            raised_pr_number,
            html_url,
            pr_ids,
            commits_marked,
        })
    }
}

pub fn batch_title(now: DateTime<Utc>) -> String {
    format!(
        "[Auto] Upstream PR batch {}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Lists the contained pull requests in selection order.
pub fn batch_body(titles: &[&str]) -> String {
    format!("Contains:\n\n* {}", titles.join("\n* "))
}
