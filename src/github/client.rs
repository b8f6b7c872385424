use octocrab::Octocrab;
use serde::Serialize;
use tracing::{debug, info};

use super::types::{AssignIssue, Commit, CreatePullRequest, PullRequest};
use crate::error::MergerError;

const PAGE_SIZE: u32 = 100;

#[derive(Serialize)]
struct PageParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    page: u32,
    per_page: u32,
}

/// Thin client over the hosting REST API. Any non-2xx response surfaces as
/// `MergerError::HostingApi` carrying the status code.
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, MergerError> {
        let client = Octocrab::builder()
            .base_uri(api_url)
            .map_err(|e| MergerError::Config(format!("Invalid GitHub API url {}: {}", api_url, e)))?
            .personal_token(token.to_string())
            .build()
            .map_err(|e| MergerError::HostingApi {
                status: None,
                message: format!("Failed to create GitHub client: {}", e),
            })?;

        Ok(Self { client })
    }

    pub async fn create_pull_request(
        &self,
        project: &str,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, MergerError> {
        info!(
            "Raising pull request {} -> {} on {}",
            request.head, request.base, project
        );
        let created: PullRequest = self
            .client
            .post(format!("/repos/{}/pulls", project), Some(request))
            .await?;
        info!("Raised pull request #{} (id {})", created.number, created.id);
        Ok(created)
    }

    /// Assign the issue backing pull request `number` to `assignee`.
    pub async fn assign_issue(
        &self,
        project: &str,
        number: i64,
        assignee: &str,
    ) -> Result<(), MergerError> {
        let body = AssignIssue {
            assignee: assignee.to_string(),
        };
        let _: serde_json::Value = self
            .client
            .patch(format!("/repos/{}/issues/{}", project, number), Some(&body))
            .await?;
        debug!("Assigned {}#{} to {}", project, number, assignee);
        Ok(())
    }

    /// One page of pull requests in `state` (`open`, `closed` or `all`).
    pub async fn list_pull_requests(
        &self,
        project: &str,
        state: &str,
        page: u32,
    ) -> Result<Vec<PullRequest>, MergerError> {
        let params = PageParams {
            state: Some(state),
            page,
            per_page: PAGE_SIZE,
        };
        let pulls: Vec<PullRequest> = self
            .client
            .get(format!("/repos/{}/pulls", project), Some(&params))
            .await?;
        debug!(
            "Fetched {} pull requests from {} (state={}, page={})",
            pulls.len(),
            project,
            state,
            page
        );
        Ok(pulls)
    }

    /// Commits of a pull request, oldest first.
    pub async fn list_commits(
        &self,
        project: &str,
        number: i64,
    ) -> Result<Vec<Commit>, MergerError> {
        let mut commits = Vec::new();
        let mut page = 1;
        loop {
            let params = PageParams {
                state: None,
                page,
                per_page: PAGE_SIZE,
            };
            let batch: Vec<Commit> = self
                .client
                .get(
                    format!("/repos/{}/pulls/{}/commits", project, number),
                    Some(&params),
                )
                .await?;
            let last_page = batch.len() < PAGE_SIZE as usize;
            commits.extend(batch);
            if last_page {
                return Ok(commits);
            }
            page += 1;
        }
    }
}
