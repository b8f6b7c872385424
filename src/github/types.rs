use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{NewPullRequest, PrState};

/// Body of `POST /repos/{project}/pulls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignIssue {
    pub assignee: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub url: String,
    pub html_url: Option<String>,
    pub state: String,
    pub title: String,
    pub body: Option<String>,
    pub user: Option<User>,
    pub assignee: Option<User>,
    pub milestone: Option<Milestone>,
    pub base: Option<CommitRef>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRef {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
}

impl PullRequest {
    /// Closed pull requests with a merge time are recorded as merged.
    pub fn record_state(&self) -> PrState {
        match (self.state.as_str(), self.merged_at) {
            ("open", _) => PrState::Open,
            (_, Some(_)) => PrState::Merged,
            _ => PrState::Closed,
        }
    }

    pub fn into_record(self, project: &str) -> NewPullRequest {
        let state = self.record_state();
        NewPullRequest {
            id: self.id,
            number: Some(self.number),
            project: project.to_string(),
            url: self.url,
            html_url: self.html_url,
            state,
            title: self.title,
            user_login: self.user.map(|u| u.login),
            assignee_login: self.assignee.map(|u| u.login),
            milestone_title: self.milestone.map(|m| m.title),
            base_ref: self.base.map(|b| b.ref_field),
            body: self.body.map(|b| b.replace("\r\n", "\n")),
            created_at: self.created_at,
            merged_at: self.merged_at,
            merge_commit_sha: self.merge_commit_sha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(state: &str, merged_at: Option<&str>) -> PullRequest {
        serde_json::from_value(json!({
            "id": 1001,
            "number": 12,
            "url": "https://api.github.com/repos/up/up/pulls/12",
            "html_url": "https://github.com/up/up/pull/12",
            "state": state,
            "title": "Fix fee estimation",
            "body": "line one\r\nline two",
            "user": {"login": "alice"},
            "assignee": null,
            "milestone": {"title": "1.9"},
            "base": {"ref": "master", "sha": "abc"},
            "created_at": "2015-06-01T10:00:00Z",
            "merged_at": merged_at,
            "merge_commit_sha": null
        }))
        .unwrap()
    }

    #[test]
    fn test_record_normalises_body_and_flattens_refs() {
        let record = sample("open", None).into_record("up/up");

        assert_eq!(record.id, 1001);
        assert_eq!(record.number, Some(12));
        assert_eq!(record.project, "up/up");
        assert_eq!(record.state, PrState::Open);
        assert_eq!(record.body.as_deref(), Some("line one\nline two"));
        assert_eq!(record.user_login.as_deref(), Some("alice"));
        assert_eq!(record.assignee_login, None);
        assert_eq!(record.milestone_title.as_deref(), Some("1.9"));
        assert_eq!(record.base_ref.as_deref(), Some("master"));
    }

    #[test]
    fn test_closed_with_merge_time_is_merged() {
        assert_eq!(
            sample("closed", Some("2015-06-02T10:00:00Z")).record_state(),
            PrState::Merged
        );
        assert_eq!(sample("closed", None).record_state(), PrState::Closed);
    }
}
