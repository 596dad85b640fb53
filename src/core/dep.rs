//! Dependency edges between tracked objects.
//!
//! Edges live on the objects themselves (`depends`/`blocks` uid sets); this
//! module gives them a standalone identity for replay bookkeeping, where an
//! edge may be parked until its target uid materializes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CoreError;
use super::identity::ObjectUid;

/// Edge direction as declared by the source object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepDirection {
    /// `from` depends on `to`.
    DependsOn,
    /// `from` blocks `to`.
    Blocks,
}

impl DepDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            DepDirection::DependsOn => "depends_on",
            DepDirection::Blocks => "blocks",
        }
    }
}

/// A directed dependency edge. Identity is the full (from, to, direction)
/// tuple, so re-adding an existing edge is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepEdge {
    pub from: ObjectUid,
    pub to: ObjectUid,
    pub direction: DepDirection,
}

impl DepEdge {
    pub fn new(from: ObjectUid, to: ObjectUid, direction: DepDirection) -> Result<Self, CoreError> {
        if from == to {
            return Err(CoreError::SelfDependency {
                uid: from.to_string(),
            });
        }
        Ok(Self { from, to, direction })
    }
}

impl fmt::Display for DepEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.from, self.direction.as_str(), self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_edge_rejected() {
        let uid = ObjectUid::generate();
        assert!(DepEdge::new(uid.clone(), uid, DepDirection::Blocks).is_err());
    }

    #[test]
    fn edges_compare_by_tuple() {
        let a = ObjectUid::generate();
        let b = ObjectUid::generate();
        let e1 = DepEdge::new(a.clone(), b.clone(), DepDirection::DependsOn).unwrap();
        let e2 = DepEdge::new(a, b, DepDirection::DependsOn).unwrap();
        assert_eq!(e1, e2);
    }
}
