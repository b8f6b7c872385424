#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use git2::{build::CheckoutBuilder, Commit, Oid, Repository, Signature, Time};
use serde_json::{json, Value};
use tempfile::TempDir;

use merge_batcher::config::AppConfig;
use merge_batcher::database::models::{NewPullRequest, PrState};
use merge_batcher::database::Database;

pub const SHARED_FILE: &str = "shared.txt";

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("Failed to create test database")
}

pub fn upstream_author() -> Signature<'static> {
    Signature::new(
        "Alice Upstream",
        "alice@upstream.example",
        &Time::new(1_400_000_000, 0),
    )
    .unwrap()
}

pub fn service_committer() -> Signature<'static> {
    Signature::new("Merge Bot", "bot@example.com", &Time::new(1_500_000_000, 0)).unwrap()
}

pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 6, day, 12, 0, 0).unwrap()
}

/// A downstream clone with `main` checked out and a bare `origin` to push to.
pub struct TestRepo {
    pub dir: TempDir,
    pub origin: TempDir,
    pub repo: Repository,
    /// Initial commit shared by upstream and downstream history.
    pub base: Oid,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let origin = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Repository::init_bare(origin.path()).unwrap();
        repo.remote("origin", origin.path().to_str().unwrap()).unwrap();

        let author = upstream_author();
        let readme = write_commit(
            &repo,
            None,
            &[("README", "fork\n"), (SHARED_FILE, "base\n")],
            "Initial commit",
            &author,
        );
        repo.reference("refs/heads/main", readme, true, "init").unwrap();
        repo.set_head("refs/heads/main").unwrap();
        repo.checkout_head(Some(CheckoutBuilder::new().force())).unwrap();

        TestRepo {
            dir,
            origin,
            repo,
            base: readme,
        }
    }

    /// Create an upstream commit object on top of `parent` without moving any branch.
    pub fn upstream_commit(&self, parent: Oid, path: &str, contents: &str, message: &str) -> Oid {
        write_commit(&self.repo, Some(parent), &[(path, contents)], message, &upstream_author())
    }

    /// Commit directly on `main` and refresh the working tree.
    pub fn downstream_commit(&self, path: &str, contents: &str, message: &str) -> Oid {
        let tip = self.tip("main");
        let oid = write_commit(
            &self.repo,
            Some(tip),
            &[(path, contents)],
            message,
            &service_committer(),
        );
        self.repo.reference("refs/heads/main", oid, true, message).unwrap();
        self.repo.checkout_head(Some(CheckoutBuilder::new().force())).unwrap();
        oid
    }

    pub fn tip(&self, branch: &str) -> Oid {
        self.repo
            .find_branch(branch, git2::BranchType::Local)
            .unwrap()
            .get()
            .target()
            .unwrap()
    }

    pub fn local_branches(&self) -> Vec<String> {
        branch_names(&self.repo)
    }

    pub fn origin_repo(&self) -> Repository {
        Repository::open_bare(self.origin.path()).unwrap()
    }

    pub fn head_branch(&self) -> String {
        self.repo.head().unwrap().shorthand().unwrap().to_string()
    }

    /// Configuration pointing at this clone, the given hosting API and trivially passing build steps.
    pub fn config(&self, api_url: &str, batch_size: usize) -> AppConfig {
        let yaml = format!(
            r#"
repository:
  path: {path}
  base_branch: main
  committer:
    name: Merge Bot
    email: bot@example.com
github:
  api_url: {api_url}
  token: test-token
  username: mergebot
  downstream_project: fork/fork
batch:
  size: {batch_size}
  cooldown_secs: 0
build:
  steps:
    - {{ stage: setup, program: "true" }}
    - {{ stage: compile, program: "true" }}
    - {{ stage: test, program: "true" }}
"#,
            path = self.dir.path().display(),
            api_url = api_url,
            batch_size = batch_size
        );
        AppConfig::from_yaml(&yaml).unwrap()
    }
}

pub fn write_commit(
    repo: &Repository,
    parent: Option<Oid>,
    files: &[(&str, &str)],
    message: &str,
    author: &Signature<'_>,
) -> Oid {
    let parent_commit = parent.map(|p| repo.find_commit(p).unwrap());
    let base_tree = parent_commit.as_ref().map(|c| c.tree().unwrap());
    let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
    for (path, contents) in files {
        let blob = repo.blob(contents.as_bytes()).unwrap();
        builder.insert(path, blob, 0o100644).unwrap();
    }
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let parents: Vec<&Commit> = parent_commit.iter().collect();
    repo.commit(None, author, author, message, &tree, &parents).unwrap()
}

pub fn branch_names(repo: &Repository) -> Vec<String> {
    let mut names: Vec<String> = repo
        .branches(Some(git2::BranchType::Local))
        .unwrap()
        .map(|b| b.unwrap().0.name().unwrap().unwrap().to_string())
        .collect();
    names.sort();
    names
}

/// First-parent history from `tip` back to (excluding) `stop`.
pub fn commits_between(repo: &Repository, tip: Oid, stop: Oid) -> Vec<Oid> {
    let mut oids = Vec::new();
    let mut current = tip;
    while current != stop {
        oids.push(current);
        current = repo.find_commit(current).unwrap().parent_id(0).unwrap();
    }
    oids.reverse();
    oids
}

pub fn upstream_pr(id: i64, number: i64, title: &str, merged_day: u32) -> NewPullRequest {
    NewPullRequest {
        id,
        number: Some(number),
        project: "up/up".to_string(),
        url: format!("https://api.github.com/repos/up/up/pulls/{}", number),
        html_url: Some(format!("https://github.com/up/up/pull/{}", number)),
        state: PrState::Merged,
        title: title.to_string(),
        user_login: Some("alice".to_string()),
        assignee_login: None,
        milestone_title: None,
        base_ref: Some("master".to_string()),
        body: None,
        created_at: ts(1),
        merged_at: Some(ts(merged_day)),
        merge_commit_sha: None,
    }
}

/// Downstream pull request awaiting a build, as the coordinator sees it.
pub fn buildable_pr(id: i64, number: i64) -> NewPullRequest {
    NewPullRequest {
        id,
        number: Some(number),
        project: "fork/fork".to_string(),
        url: format!("https://api.github.com/repos/fork/fork/pulls/{}", number),
        html_url: None,
        state: PrState::Open,
        title: format!("Batch {}", number),
        user_login: Some("mergebot".to_string()),
        assignee_login: None,
        milestone_title: None,
        base_ref: Some("main".to_string()),
        body: None,
        created_at: ts(1),
        merged_at: None,
        merge_commit_sha: None,
    }
}

/// Record an upstream pull request with its commits, all approved.
pub async fn seed_approved(db: &Database, pr: NewPullRequest, commits: &[Oid]) {
    let shas: Vec<String> = commits.iter().map(|c| c.to_string()).collect();
    db.upsert_pull_request(&pr).await.unwrap();
    db.insert_commits(pr.id, &shas).await.unwrap();
    db.mark_commits_to_merge(&shas).await.unwrap();
}

/// Hosting API representation of a pull request.
pub fn github_pull(id: i64, number: i64, project: &str, title: &str) -> Value {
    json!({
        "id": id,
        "number": number,
        "url": format!("https://api.github.com/repos/{}/pulls/{}", project, number),
        "html_url": format!("https://github.com/{}/pull/{}", project, number),
        "state": "open",
        "title": title,
        "body": "Contains:\r\n\r\n* something",
        "user": { "login": "mergebot" },
        "assignee": null,
        "milestone": null,
        "base": { "ref": "main", "sha": null },
        "created_at": "2015-06-10T12:00:00Z",
        "merged_at": null,
        "merge_commit_sha": null
    })
}
