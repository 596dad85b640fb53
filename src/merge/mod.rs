//! Merge engine: evaluates and executes pull-request merges.
//!
//! Evaluation classifies a request against the target history (fast-forward,
//! needs a merge commit, conflicted, already merged, unmergeable) and must
//! keep working after the source fork is deleted, by falling back to the
//! commit hashes recorded when the request was opened. Execution either
//! fast-forwards the target ref or creates a merge commit; it never forces
//! history.

pub mod diffstat;
pub mod engine;
mod error;

pub use diffstat::FileDiffStat;
pub use engine::{MergeDecision, MergeEngine, MergeReply, PullRequestRefs};
pub use error::MergeError;
