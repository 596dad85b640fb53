//! Tracked objects: tickets and pull requests.
//!
//! A TrackedObject is the unit of snapshot serialization. Everything mutable
//! about it lives here; the history repository stores full-state documents
//! of this struct, the index stores a queryable projection of it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::CoreError;
use super::identity::{CommentId, ObjectUid, ProjectRef, Username};

/// Which tracked-object class an object belongs to.
///
/// Each class has its own history repository per project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Ticket,
    Request,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Ticket => "ticket",
            ObjectKind::Request => "request",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "ticket" => Ok(ObjectKind::Ticket),
            "request" => Ok(ObjectKind::Request),
            _ => Err(CoreError::InvalidKind { raw: s.to_string() }),
        }
    }
}

/// Lifecycle status. Objects are never deleted, only transitioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Closed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "open" => Ok(Status::Open),
            "closed" => Ok(Status::Closed),
            _ => Err(CoreError::InvalidStatus { raw: s.to_string() }),
        }
    }
}

/// A single comment. Identity is the stable id, never the list position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub user: Username,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
}

/// Pull-request specifics carried alongside the common object fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullDetails {
    /// Target branch in the target project.
    pub branch: String,
    /// Source branch in the source project/fork.
    pub branch_from: String,
    /// Source project; `None` once the fork is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_from: Option<ProjectRef>,
    /// First commit of the request, recorded at open time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_start: Option<String>,
    /// Last commit of the request, recorded at open time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_stop: Option<String>,
}

/// A ticket or pull request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub kind: ObjectKind,
    pub uid: ObjectUid,
    /// Numeric id, unique only within the project.
    pub id: u64,
    pub project: ProjectRef,
    pub title: String,
    pub content: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    pub private: bool,
    pub user: Username,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Username>,
    pub tags: BTreeSet<String>,
    pub comments: Vec<Comment>,
    /// Uids this object depends on.
    pub depends: BTreeSet<ObjectUid>,
    /// Uids this object blocks.
    pub blocks: BTreeSet<ObjectUid>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<PullDetails>,
}

impl TrackedObject {
    /// Create a new ticket.
    pub fn new_ticket(
        project: ProjectRef,
        id: u64,
        title: impl Into<String>,
        content: impl Into<String>,
        user: Username,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            kind: ObjectKind::Ticket,
            uid: ObjectUid::generate(),
            id,
            project,
            title: title.into(),
            content: content.into(),
            status: Status::Open,
            close_reason: None,
            private: false,
            user,
            assignee: None,
            tags: BTreeSet::new(),
            comments: Vec::new(),
            depends: BTreeSet::new(),
            blocks: BTreeSet::new(),
            custom_fields: BTreeMap::new(),
            date_created: now,
            request: None,
        }
    }

    /// Create a new pull request.
    pub fn new_request(
        project: ProjectRef,
        id: u64,
        title: impl Into<String>,
        user: Username,
        now: OffsetDateTime,
        details: PullDetails,
    ) -> Self {
        let mut obj = Self::new_ticket(project, id, title, "", user, now);
        obj.kind = ObjectKind::Request;
        obj.request = Some(details);
        obj
    }

    /// Append a comment unless one with the same id is already present.
    ///
    /// Returns whether the comment was added.
    pub fn add_comment(&mut self, comment: Comment) -> bool {
        if self.comments.iter().any(|c| c.id == comment.id) {
            return false;
        }
        self.comments.push(comment);
        true
    }

    /// Add a "depends on" edge. Duplicate edges are idempotent no-ops.
    pub fn add_depends(&mut self, target: ObjectUid) -> Result<bool, CoreError> {
        if target == self.uid {
            return Err(CoreError::SelfDependency {
                uid: self.uid.to_string(),
            });
        }
        Ok(self.depends.insert(target))
    }

    /// Add a "blocks" edge. Duplicate edges are idempotent no-ops.
    pub fn add_blocks(&mut self, target: ObjectUid) -> Result<bool, CoreError> {
        if target == self.uid {
            return Err(CoreError::SelfDependency {
                uid: self.uid.to_string(),
            });
        }
        Ok(self.blocks.insert(target))
    }

    /// Close with an optional reason.
    pub fn close(&mut self, reason: Option<String>) {
        self.status = Status::Closed;
        self.close_reason = reason;
    }

    /// Pull-request details, present only for requests.
    pub fn pull_details(&self) -> Option<&PullDetails> {
        self.request.as_ref()
    }
}
