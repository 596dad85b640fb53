//! Identity atoms.
//!
//! ObjectUid: globally unique tracked-object identifier
//! CommentId: stable comment identifier within an object
//! Username: account name used for author/assignee resolution
//! ProjectRef: where an object lives (namespace, name, fork owner)

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CoreError;

/// Globally unique tracked-object identifier.
///
/// Lowercase hex, generated from a v4 UUID. Snapshot documents reference
/// related objects by this uid, never by the per-project numeric id.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectUid(String);

impl ObjectUid {
    /// Generate a fresh uid.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse and validate a uid string.
    ///
    /// Accepts lowercase alphanumerics and hyphens; uids double as history
    /// file names, so anything that could be a path component is rejected.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Err(CoreError::InvalidUid {
                raw: s.to_string(),
                reason: "empty".into(),
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(CoreError::InvalidUid {
                raw: s.to_string(),
                reason: "must be lowercase alphanumeric or hyphen".into(),
            });
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectUid({:?})", self.0)
    }
}

impl fmt::Display for ObjectUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable comment identifier.
///
/// Comments are matched by this id on replay, never by position.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Err(CoreError::InvalidCommentId {
                raw: s.to_string(),
                reason: "empty".into(),
            });
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommentId({:?})", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account name.
///
/// Non-empty, no whitespace; otherwise unconstrained (accounts come from
/// the surrounding service, we only reference them).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(CoreError::InvalidUsername {
                raw: s,
                reason: "empty".into(),
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidUsername {
                raw: s,
                reason: "contains whitespace".into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Username({:?})", self.0)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the project a tracked object belongs to.
///
/// Forks carry the owning user; the fullname is the canonical on-disk and
/// index key: `[forks/<user>/][<namespace>/]<name>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Username>,
}

impl ProjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            user: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn fork_of(mut self, user: Username) -> Self {
        self.user = Some(user);
        self
    }

    /// Canonical fullname used for repository paths and index lookups.
    pub fn fullname(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        if let Some(user) = &self.user {
            parts.push("forks");
            parts.push(user.as_str());
        }
        if let Some(ns) = &self.namespace {
            parts.push(ns);
        }
        parts.push(&self.name);
        parts.join("/")
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_roundtrip() {
        let uid = ObjectUid::generate();
        let parsed = ObjectUid::parse(uid.as_str()).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn uid_rejects_path_components() {
        assert!(ObjectUid::parse("../escape").is_err());
        assert!(ObjectUid::parse("a/b").is_err());
        assert!(ObjectUid::parse("").is_err());
        assert!(ObjectUid::parse("UPPER").is_err());
    }

    #[test]
    fn username_rejects_whitespace() {
        assert!(Username::new("alice smith").is_err());
        assert!(Username::new("").is_err());
        assert!(Username::new("alice").is_ok());
    }

    #[test]
    fn project_fullname_forms() {
        let plain = ProjectRef::new("tools");
        assert_eq!(plain.fullname(), "tools");

        let ns = ProjectRef::new("tools").with_namespace("infra");
        assert_eq!(ns.fullname(), "infra/tools");

        let fork = ProjectRef::new("tools")
            .with_namespace("infra")
            .fork_of(Username::new("alice").unwrap());
        assert_eq!(fork.fullname(), "forks/alice/infra/tools");
    }
}
