//! Outbound mirroring: per-project deploy keys and periodic force-pushes.
//!
//! Setup provisions a dedicated keypair under a directory that must be
//! owned by the service, mode 0700, and not a symlink — violations are
//! reported, never repaired. The mirror task pushes every configured ssh
//! remote in sequence under a total time ceiling and appends the combined
//! output to a rolling log field on the project.

pub mod agent;
pub mod keys;

use std::path::PathBuf;

use thiserror::Error;

use crate::error::{Effect, Transience};
use crate::index::IndexError;

pub use agent::{MirrorOutcome, mirror_project, setup_mirroring, teardown_mirroring};
pub use keys::{encode_openssh_public, ensure_keys_dir};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MirrorError {
    #[error("deploy key already exists at {0}")]
    KeyExists(PathBuf),

    #[error("key directory {0} is a symlink")]
    FolderIsSymlink(PathBuf),

    #[error("key directory {path} has mode {mode:o}, expected 700")]
    FolderPermissions { path: PathBuf, mode: u32 },

    #[error("key directory {0} is not owned by the service user")]
    FolderOwnership(PathBuf),

    #[error("failed to serialize key material: {0}")]
    Key(String),

    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl MirrorError {
    pub fn transience(&self) -> Transience {
        match self {
            MirrorError::Io(_) => Transience::Unknown,
            MirrorError::Index(e) => e.transience(),
            // Permission and collision states require operator action.
            MirrorError::KeyExists(_)
            | MirrorError::FolderIsSymlink(_)
            | MirrorError::FolderPermissions { .. }
            | MirrorError::FolderOwnership(_)
            | MirrorError::Key(_)
            | MirrorError::UnknownProject(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            MirrorError::Io(_) => Effect::Unknown,
            MirrorError::Index(e) => e.effect(),
            _ => Effect::None,
        }
    }
}
