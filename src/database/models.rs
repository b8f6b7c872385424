use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PrState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrState::Open),
            "closed" => Ok(PrState::Closed),
            "merged" => Ok(PrState::Merged),
            _ => Err(format!("Invalid pull request state: {}", s)),
        }
    }
}

/// A pull request as recorded in the state store.
///
/// `build_node`, `claimed_at`, `test_node` and `s3_arn` form the build claim:
/// `build_node` is set only while a worker holds (or has completed) a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: Option<i64>,
    pub project: String,
    pub url: String,
    pub html_url: Option<String>,
    pub state: PrState,
    pub title: String,
    pub user_login: Option<String>,
    pub assignee_login: Option<String>,
    pub milestone_title: Option<String>,
    pub base_ref: Option<String>,
    #[serde(default, skip_serializing)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub build_node: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub test_node: Option<String>,
    pub s3_arn: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for PullRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        let state = state.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
            index: "state".to_string(),
            source: e.into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            number: row.try_get("number")?,
            project: row.try_get("project")?,
            url: row.try_get("url")?,
            html_url: row.try_get("html_url")?,
            state,
            title: row.try_get("title")?,
            user_login: row.try_get("user_login")?,
            assignee_login: row.try_get("assignee_login")?,
            milestone_title: row.try_get("milestone_title")?,
            base_ref: row.try_get("base_ref")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
            merged_at: row.try_get("merged_at")?,
            merge_commit_sha: row.try_get("merge_commit_sha")?,
            build_node: row.try_get("build_node")?,
            claimed_at: row.try_get("claimed_at")?,
            test_node: row.try_get("test_node")?,
            s3_arn: row.try_get("s3_arn")?,
        })
    }
}

/// Descriptive fields of a pull request as observed on the host.
///
/// Claim fields are owned by the coordinator and never written from here.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPullRequest {
    pub id: i64,
    pub number: Option<i64>,
    pub project: String,
    pub url: String,
    pub html_url: Option<String>,
    pub state: PrState,
    pub title: String,
    pub user_login: Option<String>,
    pub assignee_login: Option<String>,
    pub milestone_title: Option<String>,
    pub base_ref: Option<String>,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PullRequestCommit {
    pub pr_id: i64,
    pub ordinality: i64,
    pub sha: String,
    pub to_merge: bool,
    pub merged: bool,
    pub raised_pr_id: Option<i64>,
}

/// Outcome of a conditional claim update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimUpdate {
    Claimed,
    /// Zero rows affected: another worker holds the claim.
    AlreadyClaimed,
}
