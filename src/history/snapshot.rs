//! Snapshot document format.
//!
//! One file per tracked object, named by uid, containing the complete state
//! at one point in time — never a diff. All cross-references use stable
//! identifiers: related objects by uid, comments by their own id, people by
//! username. Serialization is deterministic (fixed field order, sorted
//! collections) so replay can be verified bit for bit in tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DocumentError;
use crate::core::{ObjectKind, ProjectRef, Status, TrackedObject, Username};

/// A person reference inside a document.
///
/// Carries enough to re-provision a vanished account on replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub name: String,
    pub fullname: String,
}

impl UserRef {
    pub fn from_username(username: &Username) -> Self {
        Self {
            name: username.as_str().to_string(),
            fullname: username.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDoc {
    pub id: String,
    pub user: UserRef,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDoc {
    pub branch: String,
    pub branch_from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_from: Option<ProjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_stop: Option<String>,
}

/// The self-describing full-state document committed into history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDoc {
    pub uid: String,
    pub kind: ObjectKind,
    pub id: u64,
    pub project: ProjectRef,
    pub title: String,
    pub content: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    pub private: bool,
    pub user: UserRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserRef>,
    pub tags: Vec<String>,
    pub depends: Vec<String>,
    pub blocks: Vec<String>,
    pub comments: Vec<CommentDoc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestDoc>,
}

impl SnapshotDoc {
    /// Build the document for an object's current state.
    pub fn from_object(obj: &TrackedObject) -> Self {
        Self {
            uid: obj.uid.to_string(),
            kind: obj.kind,
            id: obj.id,
            project: obj.project.clone(),
            title: obj.title.clone(),
            content: obj.content.clone(),
            status: obj.status,
            close_reason: obj.close_reason.clone(),
            private: obj.private,
            user: UserRef::from_username(&obj.user),
            assignee: obj.assignee.as_ref().map(UserRef::from_username),
            tags: obj.tags.iter().cloned().collect(),
            depends: obj.depends.iter().map(|u| u.to_string()).collect(),
            blocks: obj.blocks.iter().map(|u| u.to_string()).collect(),
            comments: obj
                .comments
                .iter()
                .map(|c| CommentDoc {
                    id: c.id.to_string(),
                    user: UserRef::from_username(&c.user),
                    comment: c.comment.clone(),
                    date_created: c.date_created,
                })
                .collect(),
            custom_fields: obj.custom_fields.clone(),
            date_created: obj.date_created,
            request: obj.request.as_ref().map(|r| RequestDoc {
                branch: r.branch.clone(),
                branch_from: r.branch_from.clone(),
                repo_from: r.repo_from.clone(),
                commit_start: r.commit_start.clone(),
                commit_stop: r.commit_stop.clone(),
            }),
        }
    }

    /// File name of this object inside the history tree.
    pub fn file_name(&self) -> &str {
        &self.uid
    }

    /// Serialize. Output is stable for identical state.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse a raw document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProjectRef;
    use time::macros::datetime;

    fn sample() -> TrackedObject {
        let mut obj = TrackedObject::new_ticket(
            ProjectRef::new("tools").with_namespace("infra"),
            4,
            "Fix the flux capacitor",
            "it drifts",
            Username::new("alice").unwrap(),
            datetime!(2026-03-01 10:00:00 UTC),
        );
        obj.tags.insert("bug".into());
        obj.tags.insert("power".into());
        obj
    }

    #[test]
    fn document_roundtrip() {
        let obj = sample();
        let doc = SnapshotDoc::from_object(&obj);
        let bytes = doc.to_bytes().unwrap();
        let parsed = SnapshotDoc::from_bytes(&bytes).unwrap();
        assert_eq!(doc, parsed);
    }

    #[test]
    fn serialization_is_deterministic() {
        let obj = sample();
        let a = SnapshotDoc::from_object(&obj).to_bytes().unwrap();
        let b = SnapshotDoc::from_object(&obj).to_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(SnapshotDoc::from_bytes(b"not json").is_err());
        assert!(SnapshotDoc::from_bytes(b"{}").is_err());
    }
}
