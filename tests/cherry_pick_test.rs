//! Replay engine tests against scratch repositories

mod common;

use common::*;
use git2::{Oid, RepositoryState};

use merge_batcher::batch::{CherryPicker, PickResult};
use merge_batcher::database::models::PullRequestCommit;
use merge_batcher::error::MergerError;
use merge_batcher::git::RepositoryExt;

fn pending(pr_id: i64, commits: &[Oid]) -> Vec<PullRequestCommit> {
    commits
        .iter()
        .enumerate()
        .map(|(i, oid)| PullRequestCommit {
            pr_id,
            ordinality: i as i64 + 1,
            sha: oid.to_string(),
            to_merge: true,
            merged: false,
            raised_pr_id: None,
        })
        .collect()
}

/// Three upstream commits that apply cleanly on `main`.
fn clean_series(fixture: &TestRepo) -> Vec<Oid> {
    let one = fixture.upstream_commit(fixture.base, "fees.txt", "one\n", "Add fee table");
    let two = fixture.upstream_commit(one, "fees.txt", "one\ntwo\n", "Extend fee table");
    let three = fixture.upstream_commit(two, "docs.txt", "fees\n", "Document fees");
    vec![one, two, three]
}

#[test]
fn test_replayed_commits_keep_author_time_and_stamp_committer_time() {
    let fixture = TestRepo::new();
    let series = clean_series(&fixture);
    fixture.repo.create_branch_from("work", "refs/heads/main").unwrap();
    let started = chrono::Utc::now().timestamp();

    // The configured signature carries a 2017 timestamp
    let picker = CherryPicker::new(&fixture.repo, service_committer());
    let result = picker
        .apply_pull_request("work", 42, &pending(42, &series))
        .unwrap();
    let PickResult::Applied { commits, .. } = result else {
        panic!("expected clean apply, got {:?}", result);
    };

    for oid in commits {
        let commit = fixture.repo.find_commit(oid).unwrap();
        assert_eq!(commit.author().when().seconds(), 1_400_000_000);
        assert!(commit.committer().when().seconds() >= started);
    }
}

#[test]
fn test_clean_apply_adds_one_commit_per_input() {
    let fixture = TestRepo::new();
    let series = clean_series(&fixture);
    let start = fixture.repo.create_branch_from("work", "refs/heads/main").unwrap();

    let picker = CherryPicker::new(&fixture.repo, service_committer());
    let result = picker
        .apply_pull_request("work", 42, &pending(42, &series))
        .unwrap();

    let PickResult::Applied { tip, commits } = result else {
        panic!("expected clean apply, got {:?}", result);
    };
    assert_eq!(tip, fixture.tip("work"));
    assert_eq!(commits_between(&fixture.repo, tip, start), commits);
    assert_eq!(commits.len(), 3);

    for (new, source) in commits.iter().zip(&series) {
        let new = fixture.repo.find_commit(*new).unwrap();
        let source = fixture.repo.find_commit(*source).unwrap();
        assert_eq!(new.author().name(), Some("Alice Upstream"));
        assert_eq!(new.author().email(), Some("alice@upstream.example"));
        assert_eq!(new.committer().name(), Some("Merge Bot"));
        assert_eq!(new.committer().email(), Some("bot@example.com"));
        // main has not diverged from the upstream base, so trees match exactly
        assert_eq!(new.tree_id(), source.tree_id());
        assert_ne!(new.id(), source.id());
        let message = new.message().unwrap();
        assert!(message.starts_with(source.message().unwrap()));
        assert!(message.contains(&format!("(cherry picked from commit {})", source.id())));
    }

    let content = std::fs::read_to_string(fixture.dir.path().join("fees.txt")).unwrap();
    assert_eq!(content, "one\ntwo\n");
    assert_eq!(fixture.repo.state(), RepositoryState::Clean);
}

#[test]
fn test_replay_follows_ordinality_not_input_order() {
    let fixture = TestRepo::new();
    let series = clean_series(&fixture);
    let start = fixture.repo.create_branch_from("work", "refs/heads/main").unwrap();

    let mut scrambled = pending(42, &series);
    scrambled.swap(0, 2);
    scrambled.swap(1, 2);
    assert_ne!(scrambled[0].ordinality, 1);

    let picker = CherryPicker::new(&fixture.repo, service_committer());
    let PickResult::Applied { tip, .. } = picker.apply_pull_request("work", 42, &scrambled).unwrap()
    else {
        panic!("expected clean apply");
    };

    let messages: Vec<String> = commits_between(&fixture.repo, tip, start)
        .into_iter()
        .map(|oid| {
            let commit = fixture.repo.find_commit(oid).unwrap();
            commit.summary().unwrap().to_string()
        })
        .collect();
    assert_eq!(messages, vec!["Add fee table", "Extend fee table", "Document fees"]);
}

#[test]
fn test_conflict_restores_exact_tip() {
    let fixture = TestRepo::new();
    let downstream = fixture.downstream_commit(SHARED_FILE, "downstream\n", "Local change");
    let clean = fixture.upstream_commit(fixture.base, "new.txt", "new\n", "Add new file");
    let conflicting = fixture.upstream_commit(clean, SHARED_FILE, "upstream\n", "Change shared");

    let start = fixture.repo.create_branch_from("work", "refs/heads/main").unwrap();
    assert_eq!(start, downstream);

    let picker = CherryPicker::new(&fixture.repo, service_committer());
    let result = picker
        .apply_pull_request("work", 7, &pending(7, &[clean, conflicting]))
        .unwrap();

    match result {
        PickResult::Conflict { sha, paths } => {
            assert_eq!(sha, conflicting.to_string());
            assert_eq!(paths, vec![SHARED_FILE.to_string()]);
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(fixture.tip("work"), start);
    assert_eq!(fixture.repo.state(), RepositoryState::Clean);
    assert!(!fixture.dir.path().join("new.txt").exists());
    assert_eq!(
        std::fs::read_to_string(fixture.dir.path().join(SHARED_FILE)).unwrap(),
        "downstream\n"
    );
    assert!(!fixture.repo.index().unwrap().has_conflicts());
}

#[test]
fn test_batch_skips_conflicting_pull_request_only() {
    let fixture = TestRepo::new();
    fixture.downstream_commit(SHARED_FILE, "downstream\n", "Local change");
    let first = fixture.upstream_commit(fixture.base, "a.txt", "a\n", "Add a");
    let conflicting =
        fixture.upstream_commit(fixture.base, SHARED_FILE, "upstream\n", "Change shared");
    let last = fixture.upstream_commit(fixture.base, "b.txt", "b\n", "Add b");

    let start = fixture.repo.create_branch_from("batch", "refs/heads/main").unwrap();
    let picker = CherryPicker::new(&fixture.repo, service_committer());
    let application = picker
        .apply_batch(
            "batch",
            &[
                (1, pending(1, &[first])),
                (2, pending(2, &[conflicting])),
                (3, pending(3, &[last])),
            ],
        )
        .unwrap();

    assert_eq!(application.applied, vec![1, 3]);
    assert_eq!(application.conflicts, vec![(2, conflicting.to_string())]);
    let tip = application.tip.unwrap();
    assert_eq!(commits_between(&fixture.repo, tip, start).len(), 2);
    assert!(fixture.dir.path().join("a.txt").exists());
    assert!(fixture.dir.path().join("b.txt").exists());
}

#[test]
fn test_unknown_commit_restores_branch_and_errors() {
    let fixture = TestRepo::new();
    let first = fixture.upstream_commit(fixture.base, "a.txt", "a\n", "Add a");
    let start = fixture.repo.create_branch_from("work", "refs/heads/main").unwrap();

    let mut commits = pending(3, &[first]);
    commits.push(PullRequestCommit {
        pr_id: 3,
        ordinality: 2,
        sha: "1111111111111111111111111111111111111111".to_string(),
        to_merge: true,
        merged: false,
        raised_pr_id: None,
    });

    let picker = CherryPicker::new(&fixture.repo, service_committer());
    let err = picker.apply_pull_request("work", 3, &commits).unwrap_err();
    assert!(matches!(err, MergerError::Git(_)));
    assert_eq!(fixture.tip("work"), start);
}

#[test]
fn test_existing_branch_is_a_collision() {
    let fixture = TestRepo::new();
    fixture.repo.create_branch_from("upstream-pr-5", "refs/heads/main").unwrap();

    let err = fixture
        .repo
        .create_branch_from("upstream-pr-5", "refs/heads/main")
        .unwrap_err();
    assert!(matches!(err, MergerError::BranchCollision(name) if name == "upstream-pr-5"));
}
