use thiserror::Error;

use crate::core::CoreError;
use crate::gateway::GatewayError;
use crate::history::HistoryError;
use crate::index::IndexError;
use crate::merge::MergeError;
use crate::mirror::MirrorError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// Not a "god error": a thin wrapper over canonical capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::History(e) => e.transience(),
            Error::Merge(e) => e.transience(),
            Error::Gateway(e) => e.transience(),
            Error::Mirror(e) => e.transience(),
            Error::Index(e) => e.transience(),
            Error::Config(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(_) => Effect::None,
            Error::History(e) => e.effect(),
            Error::Merge(e) => e.effect(),
            Error::Gateway(e) => e.effect(),
            Error::Mirror(e) => e.effect(),
            Error::Index(e) => e.effect(),
            Error::Config(_) => Effect::None,
        }
    }
}
