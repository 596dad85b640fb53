//! Snapshot read/replay path.
//!
//! Replay reconciles full-state documents back into the relational index,
//! e.g. after a disaster-recovery restore onto an empty database. Rules:
//!
//! - comments are append-only, matched by their stable id, never by position
//! - the document is authoritative for tags: tags it does not mention are
//!   removed from the index
//! - the assignee is resolved by username; accounts referenced by a
//!   document but missing from the index are re-provisioned from it
//! - dependency edges resolve by uid; an edge whose target is not known yet
//!   is parked and retried once more objects have landed, so interdependent
//!   objects replay correctly in any order (fixed point, not single pass)
//!
//! Replaying the same document any number of times yields the same state.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::error::HistoryError;
use super::repo::HistoryRepo;
use super::snapshot::{SnapshotDoc, UserRef};
use crate::Result;
use crate::core::{
    Comment, CommentId, DepDirection, DepEdge, ObjectUid, PullDetails, TrackedObject, Username,
};
use crate::index::{Index, ProjectRecord, UserRecord};

/// Outcome of a full replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Commits walked.
    pub commits: usize,
    /// Documents applied (one per changed file per commit).
    pub documents: usize,
    /// Dependency edges that resolved, including parked ones.
    pub resolved_edges: usize,
    /// Edges whose target never materialized; dropped, not fatal.
    pub dropped_edges: Vec<DepEdge>,
}

#[derive(Default)]
pub struct SnapshotReader;

impl SnapshotReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile a single raw document into the index.
    ///
    /// Returns the dependency edges that could not be resolved yet; the
    /// caller parks them and retries after more documents have landed.
    pub fn replay_document(
        &self,
        index: &mut dyn Index,
        doc: &SnapshotDoc,
    ) -> Result<Vec<DepEdge>> {
        let uid = ObjectUid::parse(&doc.uid)?;

        let author = self.provision_user(index, &doc.user)?;
        let assignee = match &doc.assignee {
            Some(user) => Some(self.provision_user(index, user)?),
            None => None,
        };

        if index.project_by_fullname(&doc.project.fullname())?.is_none() {
            index.upsert_project(&ProjectRecord {
                fullname: doc.project.fullname(),
                owner: author.clone(),
            })?;
        }

        let existing = index.object_by_uid(&uid)?;
        let mut comments: Vec<Comment> = existing.map(|o| o.comments).unwrap_or_default();
        for cdoc in &doc.comments {
            let id = CommentId::parse(&cdoc.id)?;
            if comments.iter().any(|c| c.id == id) {
                continue;
            }
            let commenter = self.provision_user(index, &cdoc.user)?;
            comments.push(Comment {
                id,
                user: commenter,
                comment: cdoc.comment.clone(),
                date_created: cdoc.date_created,
            });
        }

        let mut object = TrackedObject {
            kind: doc.kind,
            uid: uid.clone(),
            id: doc.id,
            project: doc.project.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            status: doc.status,
            close_reason: doc.close_reason.clone(),
            private: doc.private,
            user: author,
            assignee,
            tags: doc.tags.iter().cloned().collect(),
            comments,
            depends: BTreeSet::new(),
            blocks: BTreeSet::new(),
            custom_fields: doc.custom_fields.clone(),
            date_created: doc.date_created,
            request: doc.request.as_ref().map(|r| PullDetails {
                branch: r.branch.clone(),
                branch_from: r.branch_from.clone(),
                repo_from: r.repo_from.clone(),
                commit_start: r.commit_start.clone(),
                commit_stop: r.commit_stop.clone(),
            }),
        };

        let mut parked = Vec::new();
        for (raw, direction) in doc
            .depends
            .iter()
            .map(|raw| (raw, DepDirection::DependsOn))
            .chain(doc.blocks.iter().map(|raw| (raw, DepDirection::Blocks)))
        {
            let target = ObjectUid::parse(raw)?;
            if target == uid {
                // Self-edges can only come from a hand-edited document.
                warn!(uid = %uid, "dropping self-referential dependency edge");
                continue;
            }
            if index.object_exists(&target)? {
                attach_edge(&mut object, &target, direction);
            } else {
                parked.push(DepEdge::new(uid.clone(), target, direction)?);
            }
        }

        index.upsert_object(&object)?;
        debug!(uid = %uid, parked = parked.len(), "document replayed");
        Ok(parked)
    }

    /// Replay a batch of documents, resolving parked edges to a fixed point.
    pub fn replay_documents<I>(&self, index: &mut dyn Index, docs: I) -> Result<ReplayReport>
    where
        I: IntoIterator<Item = SnapshotDoc>,
    {
        let mut report = ReplayReport::default();
        let mut pending: BTreeSet<DepEdge> = BTreeSet::new();

        for doc in docs {
            // A fresher document supersedes anything parked for its object.
            pending.retain(|edge| edge.from.as_str() != doc.uid);
            let parked = self.replay_document(index, &doc)?;
            report.resolved_edges +=
                doc.depends.len() + doc.blocks.len() - parked.len();
            pending.extend(parked);
            report.documents += 1;
        }

        self.resolve_pending(index, pending, &mut report)?;
        Ok(report)
    }

    /// Rebuild from an entire history repository, oldest commit first.
    pub fn replay_repository(
        &self,
        index: &mut dyn Index,
        repo: &HistoryRepo,
    ) -> Result<ReplayReport> {
        let commits = repo.commits_oldest_first()?;
        let mut docs = Vec::new();
        for oid in &commits {
            for file in repo.files_changed_in(*oid)? {
                let bytes = repo.read_document_at(*oid, &file)?;
                docs.push(SnapshotDoc::from_bytes(&bytes).map_err(HistoryError::from)?);
            }
        }
        let mut report = self.replay_documents(index, docs)?;
        report.commits = commits.len();
        Ok(report)
    }

    /// Retry parked edges until a pass resolves nothing more, then drop the
    /// remainder with a warning (the chosen policy for dangling edges).
    fn resolve_pending(
        &self,
        index: &mut dyn Index,
        mut pending: BTreeSet<DepEdge>,
        report: &mut ReplayReport,
    ) -> Result<()> {
        loop {
            let mut unresolved = BTreeSet::new();
            let mut progressed = false;
            for edge in pending {
                if index.object_exists(&edge.to)? {
                    if let Some(mut object) = index.object_by_uid(&edge.from)? {
                        attach_edge(&mut object, &edge.to, edge.direction);
                        index.upsert_object(&object)?;
                        report.resolved_edges += 1;
                        progressed = true;
                        continue;
                    }
                }
                unresolved.insert(edge);
            }
            pending = unresolved;
            if !progressed || pending.is_empty() {
                break;
            }
        }

        for edge in pending {
            warn!(%edge, "dropping dependency edge with unknown target");
            report.dropped_edges.push(edge);
        }
        Ok(())
    }

    fn provision_user(&self, index: &mut dyn Index, user: &UserRef) -> Result<Username> {
        let username = Username::new(user.name.clone())?;
        if index.user_by_name(username.as_str())?.is_none() {
            index.upsert_user(&UserRecord::new(username.clone(), user.fullname.clone()))?;
        }
        Ok(username)
    }
}

fn attach_edge(object: &mut TrackedObject, target: &ObjectUid, direction: DepDirection) {
    match direction {
        DepDirection::DependsOn => {
            object.depends.insert(target.clone());
        }
        DepDirection::Blocks => {
            object.blocks.insert(target.clone());
        }
    }
}
