use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::database::models::*;

const PULL_REQUEST_COLUMNS: &str = "id, number, project, url, html_url, state, title, user_login, \
     assignee_login, milestone_title, base_ref, body, created_at, merged_at, merge_commit_sha, \
     build_node, claimed_at, test_node, s3_arn";

/// Filter describing which pull requests workers may claim.
#[derive(Debug, Clone, Default)]
pub struct ClaimableFilter<'a> {
    pub project: &'a str,
    pub base_ref: &'a str,
    pub milestone: Option<&'a str>,
    /// Claims taken before this instant without an artifact count as free.
    pub stale_before: Option<DateTime<Utc>>,
}

/// A pull request with at least one approved, unmerged commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPullRequest {
    pub pr_id: i64,
    pub title: String,
}

pub struct Queries;

impl Queries {
    pub async fn get_pull_request(
        pool: &SqlitePool,
        id: i64,
    ) -> Result<Option<PullRequest>, sqlx::Error> {
        sqlx::query_as::<_, PullRequest>(&format!(
            "SELECT {} FROM pull_request WHERE id = ?",
            PULL_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Every open pull request of `project`. Closed and merged ones are left out.
    pub async fn list_open_pull_requests(
        pool: &SqlitePool,
        project: &str,
    ) -> Result<Vec<PullRequest>, sqlx::Error> {
        sqlx::query_as::<_, PullRequest>(&format!(
            "SELECT {} FROM pull_request WHERE project = ? AND state = 'open' ORDER BY id ASC",
            PULL_REQUEST_COLUMNS
        ))
        .bind(project)
        .fetch_all(pool)
        .await
    }

    /// Open pull requests targeting the expected base and milestone that are
    /// unassigned and unclaimed, or whose claim lease has run out.
    pub async fn list_claimable(
        pool: &SqlitePool,
        filter: &ClaimableFilter<'_>,
    ) -> Result<Vec<PullRequest>, sqlx::Error> {
        sqlx::query_as::<_, PullRequest>(&format!(
            r#"
            SELECT {}
            FROM pull_request
            WHERE project = ?
              AND state = 'open'
              AND base_ref = ?
              AND (? IS NULL OR milestone_title = ?)
              AND (
                (build_node IS NULL AND assignee_login IS NULL)
                OR (? IS NOT NULL AND s3_arn IS NULL AND claimed_at < ?)
              )
            ORDER BY id ASC
            "#,
            PULL_REQUEST_COLUMNS
        ))
        .bind(filter.project)
        .bind(filter.base_ref)
        .bind(filter.milestone)
        .bind(filter.milestone)
        .bind(filter.stale_before)
        .bind(filter.stale_before)
        .fetch_all(pool)
        .await
    }

    /// Pull requests with approved, unmerged commits, in batch selection order:
    /// upstream merge time (unmerged last), then id. Each pull request appears once.
    pub async fn pending_pull_requests(
        pool: &SqlitePool,
    ) -> Result<Vec<PendingPullRequest>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT pr.id, pr.title
            FROM pull_request pr
                JOIN pull_request_commit c ON c.pr_id = pr.id
            WHERE c.to_merge = 1 AND c.merged = 0
            ORDER BY pr.merged_at ASC NULLS LAST, pr.id ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut pending: Vec<PendingPullRequest> = Vec::new();
        for row in rows {
            let pr_id: i64 = row.try_get("id")?;
            if pending.iter().any(|p| p.pr_id == pr_id) {
                continue;
            }
            pending.push(PendingPullRequest {
                pr_id,
                title: row.try_get("title")?,
            });
        }
        Ok(pending)
    }

    /// Approved, unmerged commits of one pull request in replay order.
    pub async fn pending_commits(
        pool: &SqlitePool,
        pr_id: i64,
    ) -> Result<Vec<PullRequestCommit>, sqlx::Error> {
        sqlx::query_as::<_, PullRequestCommit>(
            r#"
            SELECT pr_id, ordinality, sha, to_merge, merged, raised_pr_id
            FROM pull_request_commit
            WHERE pr_id = ? AND to_merge = 1 AND merged = 0
            ORDER BY ordinality ASC
            "#,
        )
        .bind(pr_id)
        .fetch_all(pool)
        .await
    }

    pub async fn commits_for_pull_request(
        pool: &SqlitePool,
        pr_id: i64,
    ) -> Result<Vec<PullRequestCommit>, sqlx::Error> {
        sqlx::query_as::<_, PullRequestCommit>(
            r#"
            SELECT pr_id, ordinality, sha, to_merge, merged, raised_pr_id
            FROM pull_request_commit
            WHERE pr_id = ?
            ORDER BY ordinality ASC
            "#,
        )
        .bind(pr_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_pull_requests(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pull_request")
            .fetch_one(pool)
            .await
    }
}
