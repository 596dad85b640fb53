//! History repositories: the durable system of record.
//!
//! Every ticket and pull request is serialized as a full-state snapshot
//! document and committed into a dedicated bare repository, one repository
//! per tracked-object class per project, one file per object keyed by uid.
//! The relational index is a projection of these histories and can always
//! be rebuilt by replaying them commit by commit.

pub mod error;
pub mod replay;
pub mod repo;
pub mod snapshot;
pub mod writer;

pub use error::{DocumentError, HistoryError};
pub use replay::{ReplayReport, SnapshotReader};
pub use repo::HistoryRepo;
pub use snapshot::SnapshotDoc;
pub use writer::SnapshotWriter;
