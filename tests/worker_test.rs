//! Build worker rounds against a mock coordinator and a local upstream remote

mod common;

use std::path::PathBuf;

use common::*;
use git2::Repository;
use serde_json::{json, Value};
use serial_test::serial;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use merge_batcher::config::{AppConfig, BuildStepConfig, HttpAuthConfig, WorkerConfig};
use merge_batcher::error::BuildStage;
use merge_batcher::worker::{BuildWorker, WorkerOutcome};

const READY_PATH: &str = "/automerge/api/v1.0/pr/build_ready";
const UPDATE_PATH: &str = "/automerge/api/v1.0/pr/99";

/// Upstream remote publishing pull request #12 under `refs/pull/12/head`.
fn upstream_with_pull(fixture: &TestRepo) -> TempDir {
    let dir = TempDir::new().unwrap();
    let upstream = Repository::init_bare(dir.path()).unwrap();
    let head = write_commit(
        &upstream,
        None,
        &[("README", "upstream\n"), ("fees.txt", "one\n")],
        "Fix fee estimation",
        &upstream_author(),
    );
    upstream
        .reference("refs/pull/12/head", head, true, "pull request head")
        .unwrap();
    fixture
        .repo
        .remote("upstream", dir.path().to_str().unwrap())
        .unwrap();
    dir
}

fn worker_config(
    fixture: &TestRepo,
    coordinator: &MockServer,
    artifacts: &TempDir,
    step: BuildStepConfig,
) -> AppConfig {
    let mut config = fixture.config("http://127.0.0.1:9", 1);
    config.build.steps = vec![step];
    config.worker = Some(WorkerConfig {
        coordinator_url: coordinator.uri(),
        auth: HttpAuthConfig {
            username: "automerge".to_string(),
            password: "hunter2".to_string(),
        },
        node_name: "builder-1".to_string(),
        poll_interval_secs: 1,
        artifact_dir: artifacts.path().to_path_buf(),
        artifact_prefix: "builds".to_string(),
        artifacts: vec![PathBuf::from("src/dogecoind")],
        fetch_remote: "upstream".to_string(),
    });
    config
}

fn ready_pull() -> Value {
    json!({
        "id": 99,
        "number": 12,
        "project": "fork/fork",
        "url": "https://api.github.com/repos/fork/fork/pulls/12",
        "html_url": null,
        "state": "open",
        "title": "Batch 12",
        "user_login": "mergebot",
        "assignee_login": null,
        "milestone_title": null,
        "base_ref": "main",
        "created_at": "2015-06-01T12:00:00Z",
        "merged_at": null,
        "merge_commit_sha": null,
        "build_node": null,
        "claimed_at": null,
        "test_node": null,
        "s3_arn": null
    })
}

async fn mock_coordinator(server: &MockServer, prs: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(READY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prs": prs })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(UPDATE_PATH))
        .and(body_partial_json(json!({ "operation": "claim_build", "node": "builder-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success" })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
#[serial]
async fn test_worker_builds_claimed_pull_request_and_reports_artifact() {
    let server = MockServer::start().await;
    mock_coordinator(&server, vec![ready_pull()]).await;
    Mock::given(method("POST"))
        .and(path(UPDATE_PATH))
        .and(body_partial_json(json!({
            "operation": "build_success",
            "node": "builder-1",
            "s3_arn": "builds/12/dogecoind"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let fixture = TestRepo::new();
    let _upstream = upstream_with_pull(&fixture);
    let artifacts = TempDir::new().unwrap();
    let step = BuildStepConfig::new(
        BuildStage::Compile,
        "sh",
        &["-c", "test -f fees.txt && mkdir -p src && echo bin > src/dogecoind"],
    );
    let config = worker_config(&fixture, &server, &artifacts, step);

    let worker = BuildWorker::from_config(&config).unwrap();
    let outcome = worker.run_once().await.unwrap();

    assert_eq!(
        outcome,
        Some(WorkerOutcome::Built {
            pr_id: 99,
            artifact: "builds/12/dogecoind".to_string(),
        })
    );
    assert_eq!(
        std::fs::read_to_string(artifacts.path().join("builds/12/dogecoind")).unwrap(),
        "bin\n"
    );
    assert_eq!(fixture.head_branch(), "main");
    assert!(fixture.local_branches().contains(&"pr-12".to_string()));
}

#[tokio::test]
#[serial]
async fn test_worker_reports_failed_build() {
    let server = MockServer::start().await;
    mock_coordinator(&server, vec![ready_pull()]).await;
    Mock::given(method("POST"))
        .and(path(UPDATE_PATH))
        .and(body_partial_json(json!({ "operation": "build_failed", "node": "builder-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let fixture = TestRepo::new();
    let _upstream = upstream_with_pull(&fixture);
    let artifacts = TempDir::new().unwrap();
    let step = BuildStepConfig::new(BuildStage::Compile, "sh", &["-c", "exit 2"]);
    let config = worker_config(&fixture, &server, &artifacts, step);

    let worker = BuildWorker::from_config(&config).unwrap();
    let outcome = worker.run_once().await.unwrap();

    assert_eq!(
        outcome,
        Some(WorkerOutcome::Failed {
            pr_id: 99,
            stage: BuildStage::Compile,
        })
    );
    assert!(!artifacts.path().join("builds/12").exists());
    assert_eq!(fixture.head_branch(), "main");
}

#[tokio::test]
#[serial]
async fn test_worker_idles_when_nothing_is_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(READY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prs": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success" })))
        .expect(0)
        .mount(&server)
        .await;

    let fixture = TestRepo::new();
    let artifacts = TempDir::new().unwrap();
    let step = BuildStepConfig::new(BuildStage::Compile, "true", &[]);
    let config = worker_config(&fixture, &server, &artifacts, step);

    let worker = BuildWorker::from_config(&config).unwrap();
    assert_eq!(worker.run_once().await.unwrap(), None);
}
