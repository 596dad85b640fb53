//! Mergeability evaluation and merge execution.
//!
//! State machine:
//!
//! ```text
//! UNKNOWN --(evaluate)--> FAST_FORWARD | NEEDS_MERGE_COMMIT | CONFLICTED | UNMERGEABLE(reason)
//! FAST_FORWARD --(merge)--> MERGED
//! NEEDS_MERGE_COMMIT --(merge)--> MERGED | CONFLICTED
//! CONFLICTED --(evaluate)--> re-evaluated on demand, never auto-retried
//! UNMERGEABLE --(terminal until either ref moves)
//! ```
//!
//! Decisions are computed fresh on every call. Execution is serialized per
//! request; losers of a race observe ALREADY_MERGED or CONFLICTED.

use std::path::PathBuf;

use git2::{Oid, Repository, Signature, Sort};
use tracing::{debug, info};

use super::diffstat::{self, FileDiffStat};
use super::error::MergeError;
use crate::config::StorageConfig;
use crate::core::{ObjectUid, TrackedObject, UidLocks, Username};
use crate::paths;

/// Everything the engine needs to know about one pull request.
///
/// Built from the tracked object plus storage configuration; the engine
/// itself never touches the index.
#[derive(Clone, Debug)]
pub struct PullRequestRefs {
    pub uid: ObjectUid,
    pub id: u64,
    pub title: String,
    /// Target (bare) repository on disk.
    pub target_repo: PathBuf,
    /// Target branch name.
    pub branch: String,
    /// Source repository; `None` once the fork is deleted.
    pub source_repo: Option<PathBuf>,
    /// Source branch name.
    pub branch_from: String,
    /// First/last commit of the request, recorded at open time.
    pub commit_start: Option<String>,
    pub commit_stop: Option<String>,
}

impl PullRequestRefs {
    /// Derive the refs for a pull-request object.
    pub fn from_object(obj: &TrackedObject, storage: &StorageConfig) -> Result<Self, MergeError> {
        let details = obj.pull_details().ok_or(MergeError::NotARequest)?;
        let source_repo = details
            .repo_from
            .as_ref()
            .map(|p| paths::project_repo_path(storage, &p.fullname()));
        Ok(Self {
            uid: obj.uid.clone(),
            id: obj.id,
            title: obj.title.clone(),
            target_repo: paths::project_repo_path(storage, &obj.project.fullname()),
            branch: details.branch.clone(),
            source_repo,
            branch_from: details.branch_from.clone(),
            commit_start: details.commit_start.clone(),
            commit_stop: details.commit_stop.clone(),
        })
    }

    /// Ref inside the target repository that keeps the request's commits
    /// reachable after the fork goes away.
    pub fn tracking_ref(&self) -> String {
        format!("refs/pull/{}/head", self.uid)
    }

    fn target_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

/// Outcome classification shared by evaluation and execution.
///
/// `Merged` is only ever produced by execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeDecision {
    FastForward,
    NeedsMergeCommit,
    Conflicted,
    AlreadyMerged,
    Merged,
    Unmergeable { reason: String },
}

impl MergeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeDecision::FastForward => "FFORWARD",
            MergeDecision::NeedsMergeCommit => "MERGE",
            MergeDecision::Conflicted => "CONFLICTS",
            MergeDecision::AlreadyMerged => "NO_CHANGE",
            MergeDecision::Merged => "MERGED",
            MergeDecision::Unmergeable { .. } => "UNMERGEABLE",
        }
    }
}

/// Result of the mutating merge call: a short message plus resulting state.
#[derive(Clone, Debug)]
pub struct MergeReply {
    pub decision: MergeDecision,
    pub message: String,
}

impl MergeReply {
    fn new(decision: MergeDecision, message: impl Into<String>) -> Self {
        Self {
            decision,
            message: message.into(),
        }
    }
}

/// Resolved tips for one evaluation.
struct Tips {
    target: Oid,
    source: Oid,
}

#[derive(Default)]
pub struct MergeEngine {
    locks: UidLocks,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the request without touching any ref.
    ///
    /// Safe to call concurrently; conflicted results are re-evaluated on
    /// demand and never retried automatically.
    pub fn evaluate(&self, pr: &PullRequestRefs) -> Result<MergeDecision, MergeError> {
        let repo = open_target(pr)?;
        Ok(self.evaluate_inner(&repo, pr)?.0)
    }

    /// Per-file diff statistics against the merge-base.
    ///
    /// Prefers the commit span recorded at open time, so statistics are
    /// identical whether or not the source fork still exists on disk, and
    /// unrelated concurrent changes on the target never pollute the result.
    pub fn diff_stats(&self, pr: &PullRequestRefs) -> Result<Vec<FileDiffStat>, MergeError> {
        let repo = open_target(pr)?;

        if let (Some(start), Some(stop)) = (&pr.commit_start, &pr.commit_stop) {
            let start = parse_oid(start)?;
            let stop = parse_oid(stop)?;
            let start_commit = repo.find_commit(start)?;
            let old_tree = match start_commit.parent(0) {
                Ok(parent) => Some(parent.tree()?),
                Err(_) => None,
            };
            let new_tree = repo.find_commit(stop)?.tree()?;
            return diffstat::stats_between(&repo, old_tree.as_ref(), &new_tree);
        }

        // Not recorded yet: derive from live refs via the merge-base.
        let (decision, tips) = self.evaluate_inner(&repo, pr)?;
        let Some(tips) = tips else {
            return Err(MergeError::BadRecordedCommit(format!(
                "no commit span recorded and refs unavailable: {}",
                match decision {
                    MergeDecision::Unmergeable { reason } => reason,
                    other => other.as_str().to_string(),
                }
            )));
        };
        let base = repo.merge_base(tips.target, tips.source)?;
        let old_tree = repo.find_commit(base)?.tree()?;
        let new_tree = repo.find_commit(tips.source)?.tree()?;
        diffstat::stats_between(&repo, Some(&old_tree), &new_tree)
    }

    /// Compute the (start, stop) commit span to record at open time.
    ///
    /// `start` is the first commit unique to the request, `stop` its tip.
    pub fn recorded_span(
        &self,
        pr: &PullRequestRefs,
    ) -> Result<Option<(String, String)>, MergeError> {
        let repo = open_target(pr)?;
        let Some(tips) = self.resolve_tips(&repo, pr)? else {
            return Ok(None);
        };
        let base = match repo.merge_base(tips.target, tips.source) {
            Ok(base) => Some(base),
            Err(_) => None,
        };

        let mut walk = repo.revwalk()?;
        walk.push(tips.source)?;
        if let Some(base) = base {
            walk.hide(base)?;
        }
        walk.set_sorting(Sort::TOPOLOGICAL)?;
        let commits: Vec<Oid> = walk.collect::<Result<_, _>>()?;
        match (commits.last(), commits.first()) {
            (Some(first), Some(last)) => Ok(Some((first.to_string(), last.to_string()))),
            _ => Ok(None),
        }
    }

    /// Execute the merge.
    ///
    /// Idempotent: merging an already-merged request reports ALREADY_MERGED.
    /// Concurrent executions for the same request are serialized; exactly
    /// one observes MERGED.
    pub fn merge(&self, pr: &PullRequestRefs, actor: &Username) -> Result<MergeReply, MergeError> {
        let lock = self.locks.for_uid(&pr.uid);
        let _guard = lock.lock().expect("merge lock poisoned");

        let repo = open_target(pr)?;
        let (decision, tips) = self.evaluate_inner(&repo, pr)?;
        match decision {
            MergeDecision::AlreadyMerged => Ok(MergeReply::new(
                MergeDecision::AlreadyMerged,
                "nothing to do, changes were already merged",
            )),
            MergeDecision::Conflicted => {
                Ok(MergeReply::new(MergeDecision::Conflicted, "merge conflicts"))
            }
            MergeDecision::Unmergeable { reason } => {
                let message = reason.clone();
                Ok(MergeReply::new(MergeDecision::Unmergeable { reason }, message))
            }
            MergeDecision::FastForward => {
                let tips = tips.expect("fast-forward decision without tips");
                self.fast_forward(&repo, pr, &tips)
            }
            MergeDecision::NeedsMergeCommit => {
                let tips = tips.expect("merge decision without tips");
                self.merge_commit(&repo, pr, &tips, actor)
            }
            MergeDecision::Merged => unreachable!("evaluation never yields MERGED"),
        }
    }

    fn evaluate_inner(
        &self,
        repo: &Repository,
        pr: &PullRequestRefs,
    ) -> Result<(MergeDecision, Option<Tips>), MergeError> {
        let Some(tips) = self.resolve_tips(repo, pr)? else {
            return Ok((
                MergeDecision::Unmergeable {
                    reason: format!(
                        "source branch {} is gone and no commits were recorded",
                        pr.branch_from
                    ),
                },
                None,
            ));
        };

        if tips.source == tips.target || repo.graph_descendant_of(tips.target, tips.source)? {
            return Ok((MergeDecision::AlreadyMerged, Some(tips)));
        }

        let base = match repo.merge_base(tips.target, tips.source) {
            Ok(base) => base,
            Err(_) => {
                return Ok((
                    MergeDecision::Unmergeable {
                        reason: "no common ancestor between source and target".to_string(),
                    },
                    Some(tips),
                ));
            }
        };

        if base == tips.target {
            return Ok((MergeDecision::FastForward, Some(tips)));
        }

        let ours = repo.find_commit(tips.target)?;
        let theirs = repo.find_commit(tips.source)?;
        let index = repo.merge_commits(&ours, &theirs, None)?;
        let decision = if index.has_conflicts() {
            MergeDecision::Conflicted
        } else {
            MergeDecision::NeedsMergeCommit
        };
        Ok((decision, Some(tips)))
    }

    /// Find the target tip and the source tip.
    ///
    /// While the fork exists its branch is fetched into the target under
    /// `refs/pull/<uid>/head`, which both resolves the tip and keeps the
    /// commits reachable for later. Once the fork is gone, the recorded end
    /// commit is used instead.
    fn resolve_tips(
        &self,
        repo: &Repository,
        pr: &PullRequestRefs,
    ) -> Result<Option<Tips>, MergeError> {
        let target = match repo.refname_to_id(&pr.target_ref()) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        if let Some(source_path) = &pr.source_repo
            && source_path.exists()
            && let Some(url) = source_path.to_str()
        {
            let refspec = format!("+refs/heads/{}:{}", pr.branch_from, pr.tracking_ref());
            let mut remote = repo.remote_anonymous(url)?;
            remote
                .fetch(&[refspec.as_str()], None, None)
                .map_err(MergeError::Fetch)?;
            if let Ok(source) = repo.refname_to_id(&pr.tracking_ref()) {
                return Ok(Some(Tips { target, source }));
            }
        }

        if let Some(stop) = &pr.commit_stop {
            let oid = parse_oid(stop)?;
            if repo.find_commit(oid).is_ok() {
                return Ok(Some(Tips { target, source: oid }));
            }
        }

        Ok(None)
    }

    fn fast_forward(
        &self,
        repo: &Repository,
        pr: &PullRequestRefs,
        tips: &Tips,
    ) -> Result<MergeReply, MergeError> {
        debug!(uid = %pr.uid, from = %tips.target, to = %tips.source, "fast-forwarding");
        let moved = repo
            .reference_matching(
                &pr.target_ref(),
                tips.source,
                true,
                tips.target,
                &format!("merge request {}: fast-forward", pr.id),
            )
            .is_ok();
        if moved {
            info!(uid = %pr.uid, "request merged (fast-forward)");
            return Ok(MergeReply::new(MergeDecision::Merged, "changes merged"));
        }
        // The target ref moved underneath us (another process won).
        self.lost_race(repo, pr)
    }

    fn merge_commit(
        &self,
        repo: &Repository,
        pr: &PullRequestRefs,
        tips: &Tips,
        actor: &Username,
    ) -> Result<MergeReply, MergeError> {
        let ours = repo.find_commit(tips.target)?;
        let theirs = repo.find_commit(tips.source)?;
        let mut index = repo.merge_commits(&ours, &theirs, None)?;
        if index.has_conflicts() {
            return Ok(MergeReply::new(MergeDecision::Conflicted, "merge conflicts"));
        }
        let tree_oid = index.write_tree_to(repo)?;
        let tree = repo.find_tree(tree_oid)?;
        let sig = Signature::now(actor.as_str(), actor.as_str())?;
        let message = format!("Merge #{} `{}`", pr.id, pr.title);

        // The update-ref step requires the ref to still point at `ours`;
        // losing that race surfaces as an error here, not forced history.
        match repo.commit(
            Some(&pr.target_ref()),
            &sig,
            &sig,
            &message,
            &tree,
            &[&ours, &theirs],
        ) {
            Ok(_) => {
                info!(uid = %pr.uid, "request merged (merge commit)");
                Ok(MergeReply::new(MergeDecision::Merged, "changes merged"))
            }
            Err(_) => self.lost_race(repo, pr),
        }
    }

    /// Another writer beat us to the ref; report what they left behind.
    fn lost_race(&self, repo: &Repository, pr: &PullRequestRefs) -> Result<MergeReply, MergeError> {
        match self.evaluate_inner(repo, pr)?.0 {
            MergeDecision::AlreadyMerged => Ok(MergeReply::new(
                MergeDecision::AlreadyMerged,
                "nothing to do, changes were already merged",
            )),
            _ => Ok(MergeReply::new(MergeDecision::Conflicted, "merge conflicts")),
        }
    }
}

fn open_target(pr: &PullRequestRefs) -> Result<Repository, MergeError> {
    Repository::open(&pr.target_repo).map_err(|e| MergeError::OpenRepo(pr.target_repo.clone(), e))
}

fn parse_oid(raw: &str) -> Result<Oid, MergeError> {
    Oid::from_str(raw).map_err(|_| MergeError::BadRecordedCommit(raw.to_string()))
}
