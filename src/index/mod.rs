//! The relational index seam.
//!
//! The index is a rebuildable cache of the git history, consumed by the
//! surrounding service for queries. The core subsystems only touch it
//! through the `Index` trait: replay reconciles snapshot documents into it,
//! the mirror agent records key material and push logs on it. Losing the
//! index is recoverable; losing the history is not.

mod memory;
mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use crate::core::{CoreError, ObjectKind, ObjectUid, TrackedObject, Username};
use crate::error::{Effect, Transience};

/// An account, as far as the core subsystems care about one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: Username,
    pub fullname: String,
}

impl UserRecord {
    pub fn new(username: Username, fullname: impl Into<String>) -> Self {
        Self {
            username,
            fullname: fullname.into(),
        }
    }
}

/// A project, keyed by its canonical fullname.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub fullname: String,
    pub owner: Username,
}

/// Mirroring state for one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MirrorRecord {
    /// Configured push targets, one per line in operator input.
    pub targets: Vec<String>,
    /// Public half of the deploy key, if provisioned.
    pub public_key: Option<String>,
    /// Rolling log of push output.
    pub last_log: String,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IndexError {
    #[error("index database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored object is not decodable: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("unknown project: {0}")]
    UnknownProject(String),
}

impl IndexError {
    pub fn transience(&self) -> Transience {
        match self {
            // SQLITE_BUSY and friends may clear; we cannot tell from here.
            IndexError::Sqlite(_) => Transience::Unknown,
            IndexError::Decode(_) | IndexError::Core(_) | IndexError::UnknownProject(_) => {
                Transience::Permanent
            }
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            IndexError::Sqlite(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// Operations the core subsystems need from the relational index.
///
/// Implementations must make `upsert_object` atomic: either the whole
/// object projection (scalars, comments, tags, edges) lands, or none of it.
pub trait Index: Send {
    fn upsert_user(&mut self, user: &UserRecord) -> Result<(), IndexError>;
    fn user_by_name(&self, username: &str) -> Result<Option<UserRecord>, IndexError>;

    fn upsert_project(&mut self, project: &ProjectRecord) -> Result<(), IndexError>;
    fn project_by_fullname(&self, fullname: &str) -> Result<Option<ProjectRecord>, IndexError>;

    fn upsert_object(&mut self, object: &TrackedObject) -> Result<(), IndexError>;
    fn object_by_uid(&self, uid: &ObjectUid) -> Result<Option<TrackedObject>, IndexError>;
    fn object_exists(&self, uid: &ObjectUid) -> Result<bool, IndexError>;
    /// Next free per-project numeric id for the given class.
    fn next_local_id(&self, project: &str, kind: ObjectKind) -> Result<u64, IndexError>;

    fn mirror_state(&self, project: &str) -> Result<Option<MirrorRecord>, IndexError>;
    fn set_mirror_targets(&mut self, project: &str, targets: &[String]) -> Result<(), IndexError>;
    fn set_mirror_public_key(&mut self, project: &str, key: Option<&str>)
    -> Result<(), IndexError>;
    fn append_mirror_log(&mut self, project: &str, log: &str) -> Result<(), IndexError>;
}
