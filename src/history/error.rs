//! History storage error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Errors from committing to or reading a history repository.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("failed to open history repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("failed to initialize history repository at {0}: {1}")]
    Init(PathBuf, #[source] git2::Error),

    #[error("missing file in history tree: {0}")]
    MissingFile(String),

    #[error("expected blob but got different object type: {0}")]
    NotABlob(&'static str),

    #[error("failed to write blob: {0}")]
    WriteBlob(#[source] git2::Error),

    #[error("failed to build tree: {0}")]
    BuildTree(#[source] git2::Error),

    #[error("failed to create commit: {0}")]
    Commit(#[source] git2::Error),

    #[error("history ref contended after {0} attempts")]
    RefContention(usize),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl HistoryError {
    /// Whether retrying may succeed.
    pub fn transience(&self) -> Transience {
        match self {
            HistoryError::RefContention(_) => Transience::Retryable,

            HistoryError::OpenRepo(_, _)
            | HistoryError::Init(_, _)
            | HistoryError::MissingFile(_)
            | HistoryError::NotABlob(_)
            | HistoryError::WriteBlob(_)
            | HistoryError::BuildTree(_)
            | HistoryError::Commit(_)
            | HistoryError::Document(_) => Transience::Permanent,

            HistoryError::Git(_) => Transience::Unknown,
        }
    }

    /// What we know about side effects when this error is returned.
    pub fn effect(&self) -> Effect {
        match self {
            // The ref was never updated; loose objects may exist but are
            // invisible to readers.
            HistoryError::RefContention(_) => Effect::None,
            HistoryError::Git(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// Errors from parsing or producing snapshot documents.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field value: {0}")]
    InvalidValue(String),
}
