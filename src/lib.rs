//! slipway: the git-native core of a software forge.
//!
//! Three tightly coupled subsystems share one architectural idea: the git
//! history is the durable system of record, the relational index is a
//! rebuildable cache, and access to the git transport layer is gated by an
//! out-of-process decision call.
//!
//! - `history` — tickets and pull requests serialized as full-state snapshot
//!   documents, committed into dedicated bare repositories and replayable
//!   back into the index.
//! - `merge` — evaluates and executes pull-request merges against a target
//!   history.
//! - `gateway` — single-shot processes that authorize every raw git
//!   operation arriving over SSH.
//! - `mirror` — per-project deploy keys and outbound force-push mirroring.

pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod history;
pub mod index;
pub mod jobs;
pub mod merge;
pub mod mirror;
pub mod paths;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    Comment, CommentId, DepDirection, DepEdge, ObjectKind, ObjectUid, ProjectRef, PullDetails,
    Status, TrackedObject, Username,
};
pub use crate::index::{Index, MemoryIndex, SqliteIndex, UserRecord};
