//! Merge engine error types.
//!
//! Conflicts and missing refs are not errors: they are structured decisions
//! (`MergeDecision`). Errors here are environmental — a repository that
//! cannot be opened, a fetch that fails, a recorded hash that does not parse.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::{Effect, Transience};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MergeError {
    #[error("failed to open repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("failed to fetch from source repository: {0}")]
    Fetch(#[source] git2::Error),

    #[error("recorded commit hash is invalid: {0}")]
    BadRecordedCommit(String),

    #[error("tracked object is not a pull request")]
    NotARequest,

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl MergeError {
    pub fn transience(&self) -> Transience {
        match self {
            MergeError::Fetch(_) => Transience::Retryable,
            MergeError::OpenRepo(_, _)
            | MergeError::BadRecordedCommit(_)
            | MergeError::NotARequest => Transience::Permanent,
            MergeError::Git(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            MergeError::Git(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}
