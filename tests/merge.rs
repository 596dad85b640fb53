//! Merge engine integration: real repositories, every decision state, the
//! concurrent-merge race, and diffstat stability after fork deletion.

use std::path::PathBuf;
use std::sync::Arc;

use git2::{Oid, Repository, Signature};

use slipway::core::{ObjectUid, Username};
use slipway::merge::{MergeDecision, MergeEngine, PullRequestRefs};

fn sig() -> Signature<'static> {
    Signature::now("test", "test@example.com").unwrap()
}

/// Commit a single-file change on `refname`, returning the new tip.
fn commit_file(repo: &Repository, refname: &str, file: &str, content: &str, message: &str) -> Oid {
    let blob = repo.blob(content.as_bytes()).unwrap();
    let parent = repo.refname_to_id(refname).ok();
    let mut builder = match parent {
        Some(oid) => {
            let tree = repo.find_commit(oid).unwrap().tree().unwrap();
            repo.treebuilder(Some(&tree)).unwrap()
        }
        None => repo.treebuilder(None).unwrap(),
    };
    builder.insert(file, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let parents: Vec<_> = parent.map(|oid| repo.find_commit(oid).unwrap()).into_iter().collect();
    let parent_refs: Vec<_> = parents.iter().collect();
    let sig = sig();
    repo.commit(Some(refname), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

struct Fixture {
    _dir: tempfile::TempDir,
    target_path: PathBuf,
    fork_path: PathBuf,
}

impl Fixture {
    /// A target repository with one base commit on master, and a fork that
    /// starts from the same base on branch `feature`.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let target_path = dir.path().join("target.git");
        let fork_path = dir.path().join("fork.git");

        let target = Repository::init_bare(&target_path).unwrap();
        commit_file(&target, "refs/heads/master", "README", "base\n", "base");

        let fork = Repository::init_bare(&fork_path).unwrap();
        let mut remote = fork.remote_anonymous(target_path.to_str().unwrap()).unwrap();
        remote
            .fetch(&["+refs/heads/master:refs/heads/feature"], None, None)
            .unwrap();

        Self {
            _dir: dir,
            target_path,
            fork_path,
        }
    }

    fn target(&self) -> Repository {
        Repository::open(&self.target_path).unwrap()
    }

    fn fork(&self) -> Repository {
        Repository::open(&self.fork_path).unwrap()
    }

    fn pr(&self) -> PullRequestRefs {
        PullRequestRefs {
            uid: ObjectUid::generate(),
            id: 1,
            title: "add feature".into(),
            target_repo: self.target_path.clone(),
            branch: "master".into(),
            source_repo: Some(self.fork_path.clone()),
            branch_from: "feature".into(),
            commit_start: None,
            commit_stop: None,
        }
    }
}

fn actor() -> Username {
    Username::new("alice").unwrap()
}

#[test]
fn fast_forward_lifecycle() {
    let fx = Fixture::new();
    let tip = commit_file(&fx.fork(), "refs/heads/feature", "feature.txt", "new\n", "feature");

    let engine = MergeEngine::new();
    let pr = fx.pr();

    assert_eq!(engine.evaluate(&pr).unwrap(), MergeDecision::FastForward);

    let reply = engine.merge(&pr, &actor()).unwrap();
    assert_eq!(reply.decision, MergeDecision::Merged);
    assert_eq!(
        fx.target().refname_to_id("refs/heads/master").unwrap(),
        tip
    );

    // Merging an already-merged request is a no-op reporting current state.
    let again = engine.merge(&pr, &actor()).unwrap();
    assert_eq!(again.decision, MergeDecision::AlreadyMerged);
    assert_eq!(engine.evaluate(&pr).unwrap(), MergeDecision::AlreadyMerged);
}

#[test]
fn divergent_branches_need_a_merge_commit() {
    let fx = Fixture::new();
    commit_file(&fx.fork(), "refs/heads/feature", "feature.txt", "new\n", "feature");
    commit_file(&fx.target(), "refs/heads/master", "other.txt", "target moved\n", "target");

    let engine = MergeEngine::new();
    let pr = fx.pr();

    assert_eq!(engine.evaluate(&pr).unwrap(), MergeDecision::NeedsMergeCommit);

    let reply = engine.merge(&pr, &actor()).unwrap();
    assert_eq!(reply.decision, MergeDecision::Merged);

    let target = fx.target();
    let tip = target.refname_to_id("refs/heads/master").unwrap();
    let commit = target.find_commit(tip).unwrap();
    assert_eq!(commit.parent_count(), 2);
    assert!(commit.message().unwrap().starts_with("Merge #1"));
}

#[test]
fn conflicting_changes_never_force_history() {
    let fx = Fixture::new();
    commit_file(&fx.fork(), "refs/heads/feature", "README", "fork version\n", "fork edit");
    commit_file(&fx.target(), "refs/heads/master", "README", "target version\n", "target edit");

    let engine = MergeEngine::new();
    let pr = fx.pr();
    let before = fx.target().refname_to_id("refs/heads/master").unwrap();

    assert_eq!(engine.evaluate(&pr).unwrap(), MergeDecision::Conflicted);

    let reply = engine.merge(&pr, &actor()).unwrap();
    assert_eq!(reply.decision, MergeDecision::Conflicted);
    // The target ref did not move.
    assert_eq!(
        fx.target().refname_to_id("refs/heads/master").unwrap(),
        before
    );
}

#[test]
fn missing_target_branch_is_unmergeable() {
    let fx = Fixture::new();
    commit_file(&fx.fork(), "refs/heads/feature", "feature.txt", "new\n", "feature");

    let engine = MergeEngine::new();
    let mut pr = fx.pr();
    pr.branch = "does-not-exist".into();

    // No target ref resolvable: nothing to merge onto.
    assert!(matches!(
        engine.evaluate(&pr).unwrap(),
        MergeDecision::Unmergeable { .. }
    ));
}

#[test]
fn vanished_fork_without_recorded_commits_is_unmergeable() {
    let fx = Fixture::new();
    let engine = MergeEngine::new();
    let mut pr = fx.pr();
    pr.source_repo = None;

    assert!(matches!(
        engine.evaluate(&pr).unwrap(),
        MergeDecision::Unmergeable { .. }
    ));
}

#[test]
fn diffstats_survive_fork_deletion() {
    let fx = Fixture::new();
    commit_file(&fx.fork(), "refs/heads/feature", "feature.txt", "one\ntwo\n", "add file");
    commit_file(&fx.fork(), "refs/heads/feature", "README", "base\nmore\n", "extend readme");

    let engine = MergeEngine::new();
    let mut pr = fx.pr();

    // Evaluation fetches the fork's commits into the target and the span is
    // recorded, as happens when the request is opened.
    engine.evaluate(&pr).unwrap();
    let (start, stop) = engine.recorded_span(&pr).unwrap().unwrap();
    pr.commit_start = Some(start);
    pr.commit_stop = Some(stop);

    let with_fork = engine.diff_stats(&pr).unwrap();
    assert_eq!(with_fork.len(), 2);

    // Delete the fork; statistics must be identical.
    std::fs::remove_dir_all(&fx.fork_path).unwrap();
    pr.source_repo = None;
    let without_fork = engine.diff_stats(&pr).unwrap();
    assert_eq!(with_fork, without_fork);

    let added = with_fork
        .iter()
        .find(|f| f.new_path.as_deref() == Some("feature.txt"))
        .unwrap();
    assert_eq!(added.status, 'A');
    assert_eq!(added.lines_added, 2);
    assert_eq!(added.lines_removed, 0);

    let modified = with_fork
        .iter()
        .find(|f| f.new_path.as_deref() == Some("README"))
        .unwrap();
    assert_eq!(modified.status, 'M');
    assert_eq!(modified.lines_added, 1);
}

#[test]
fn diffstats_ignore_unrelated_target_movement() {
    let fx = Fixture::new();
    commit_file(&fx.fork(), "refs/heads/feature", "feature.txt", "new\n", "add file");

    let engine = MergeEngine::new();
    let mut pr = fx.pr();
    engine.evaluate(&pr).unwrap();
    let (start, stop) = engine.recorded_span(&pr).unwrap().unwrap();
    pr.commit_start = Some(start);
    pr.commit_stop = Some(stop);

    let before = engine.diff_stats(&pr).unwrap();

    // Unrelated work lands on the target branch.
    commit_file(&fx.target(), "refs/heads/master", "noise.txt", "noise\n", "noise");

    let after = engine.diff_stats(&pr).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.len(), 1);
}

#[test]
fn concurrent_merges_produce_exactly_one_merged() {
    let fx = Fixture::new();
    commit_file(&fx.fork(), "refs/heads/feature", "feature.txt", "new\n", "feature");

    let engine = Arc::new(MergeEngine::new());
    let pr = fx.pr();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        let pr = pr.clone();
        handles.push(std::thread::spawn(move || {
            engine.merge(&pr, &actor()).unwrap().decision
        }));
    }
    let decisions: Vec<MergeDecision> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let merged = decisions
        .iter()
        .filter(|d| **d == MergeDecision::Merged)
        .count();
    let observed = decisions
        .iter()
        .filter(|d| **d == MergeDecision::AlreadyMerged)
        .count();
    assert_eq!(merged, 1);
    assert_eq!(observed, 1);
}

#[test]
fn recorded_span_covers_request_commits() {
    let fx = Fixture::new();
    let first = commit_file(&fx.fork(), "refs/heads/feature", "a.txt", "a\n", "first");
    let second = commit_file(&fx.fork(), "refs/heads/feature", "b.txt", "b\n", "second");

    let engine = MergeEngine::new();
    let pr = fx.pr();
    let (start, stop) = engine.recorded_span(&pr).unwrap().unwrap();
    assert_eq!(start, first.to_string());
    assert_eq!(stop, second.to_string());
}
