//! Snapshot write path.
//!
//! On any accepted mutation the caller hands us the object's complete
//! current state; we commit it as the sole changed file on the history ref
//! with the acting identity as author. The caller blocks until the commit
//! lands — a mutation is not durable until both the index write and the
//! history write have succeeded.
//!
//! Writes are strictly serialized per object (uid lock) but proceed
//! concurrently across objects; the shared ref is advanced with a
//! compare-and-swap, retried on contention.

use git2::{Oid, Signature};
use tracing::debug;

use super::error::HistoryError;
use super::repo::{HISTORY_REF, HistoryRepo};
use super::snapshot::SnapshotDoc;
use crate::core::{TrackedObject, UidLocks, Username};

/// Bounded CAS retries; contention here means other objects in the same
/// project are committing, so a handful of attempts is plenty.
const MAX_REF_RETRIES: usize = 8;

#[derive(Default)]
pub struct SnapshotWriter {
    locks: UidLocks,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit the object's current state into its history repository.
    ///
    /// Returns the commit oid, or the current tip unchanged when the stored
    /// document already matches (writing the same state twice is a no-op).
    /// On error the mutation must be treated as not durable.
    pub fn write(
        &self,
        repo: &HistoryRepo,
        object: &TrackedObject,
        actor: &Username,
    ) -> Result<Oid, HistoryError> {
        let lock = self.locks.for_uid(&object.uid);
        let _guard = lock.lock().expect("uid lock poisoned");

        let doc = SnapshotDoc::from_object(object);
        let bytes = doc.to_bytes()?;
        let message = commit_message(object);

        let git = repo.raw();
        let blob_oid = git.blob(&bytes).map_err(HistoryError::WriteBlob)?;

        for _attempt in 0..MAX_REF_RETRIES {
            let parent_oid = repo.head_oid();

            // Build the new tree: head tree with this one file replaced.
            let mut builder = match parent_oid {
                Some(oid) => {
                    let head_tree = git.find_commit(oid)?.tree()?;
                    if head_tree
                        .get_name(doc.file_name())
                        .is_some_and(|entry| entry.id() == blob_oid)
                    {
                        // State unchanged since the last snapshot.
                        debug!(uid = %object.uid, "snapshot unchanged, skipping commit");
                        return Ok(oid);
                    }
                    git.treebuilder(Some(&head_tree))
                        .map_err(HistoryError::BuildTree)?
                }
                None => git.treebuilder(None).map_err(HistoryError::BuildTree)?,
            };
            builder
                .insert(doc.file_name(), blob_oid, 0o100644)
                .map_err(HistoryError::BuildTree)?;
            let tree_oid = builder.write().map_err(HistoryError::BuildTree)?;
            let tree = git.find_tree(tree_oid)?;

            let sig = Signature::now(actor.as_str(), actor.as_str())
                .map_err(HistoryError::Commit)?;

            let parents = match parent_oid {
                Some(oid) => vec![git.find_commit(oid)?],
                None => vec![],
            };
            let parent_refs: Vec<_> = parents.iter().collect();
            let commit_oid = git
                .commit(None, &sig, &sig, &message, &tree, &parent_refs)
                .map_err(HistoryError::Commit)?;

            // Compare-and-swap the ref: only advance if nobody else has.
            let updated = match parent_oid {
                Some(old) => git
                    .reference_matching(HISTORY_REF, commit_oid, true, old, &message)
                    .is_ok(),
                None => git.reference(HISTORY_REF, commit_oid, false, &message).is_ok(),
            };
            if updated {
                debug!(uid = %object.uid, commit = %commit_oid, "snapshot committed");
                return Ok(commit_oid);
            }
            // Another object's commit moved the ref; rebuild on the new tip.
        }

        Err(HistoryError::RefContention(MAX_REF_RETRIES))
    }
}

/// Deterministic commit message for a snapshot.
pub fn commit_message(object: &TrackedObject) -> String {
    format!(
        "Updated {} {}: {}",
        object.kind.as_str(),
        object.uid,
        object.title
    )
}
