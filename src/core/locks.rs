//! Per-uid serialization locks.
//!
//! Snapshot writes and merge executions must be serialized per tracked
//! object while staying concurrent across different objects. The map grows
//! with the set of uids touched by this process; entries are small and the
//! process lifetime bounds the growth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::identity::ObjectUid;

#[derive(Default)]
pub(crate) struct UidLocks {
    inner: Mutex<HashMap<ObjectUid, Arc<Mutex<()>>>>,
}

impl UidLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the lock for a uid. The caller holds the returned
    /// Arc and locks it for the duration of the critical section.
    pub(crate) fn for_uid(&self, uid: &ObjectUid) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("uid lock map poisoned");
        map.entry(uid.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
