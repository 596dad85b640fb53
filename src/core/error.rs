//! Core capability errors (parsing, validation, domain invariants).
//!
//! Bounded and stable: these represent domain/refusal states, not library
//! implementation details.

use thiserror::Error;

use crate::error::Transience;

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error("object uid `{raw}` is invalid: {reason}")]
    InvalidUid { raw: String, reason: String },

    #[error("username `{raw}` is invalid: {reason}")]
    InvalidUsername { raw: String, reason: String },

    #[error("comment id `{raw}` is invalid: {reason}")]
    InvalidCommentId { raw: String, reason: String },

    #[error("object kind `{raw}` is not recognized")]
    InvalidKind { raw: String },

    #[error("status `{raw}` is not recognized")]
    InvalidStatus { raw: String },

    #[error("dependency of {uid} on itself")]
    SelfDependency { uid: String },
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Validation failures never succeed on retry.
        Transience::Permanent
    }
}
