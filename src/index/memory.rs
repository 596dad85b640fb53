//! In-memory index, used by tests and disaster-recovery dry runs.

use std::collections::BTreeMap;

use super::{Index, IndexError, MirrorRecord, ProjectRecord, UserRecord};
use crate::core::{ObjectKind, ObjectUid, TrackedObject};

#[derive(Default)]
pub struct MemoryIndex {
    users: BTreeMap<String, UserRecord>,
    projects: BTreeMap<String, ProjectRecord>,
    objects: BTreeMap<ObjectUid, TrackedObject>,
    mirrors: BTreeMap<String, MirrorRecord>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All objects, for test assertions.
    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }
}

impl Index for MemoryIndex {
    fn upsert_user(&mut self, user: &UserRecord) -> Result<(), IndexError> {
        self.users
            .insert(user.username.as_str().to_string(), user.clone());
        Ok(())
    }

    fn user_by_name(&self, username: &str) -> Result<Option<UserRecord>, IndexError> {
        Ok(self.users.get(username).cloned())
    }

    fn upsert_project(&mut self, project: &ProjectRecord) -> Result<(), IndexError> {
        self.projects.insert(project.fullname.clone(), project.clone());
        Ok(())
    }

    fn project_by_fullname(&self, fullname: &str) -> Result<Option<ProjectRecord>, IndexError> {
        Ok(self.projects.get(fullname).cloned())
    }

    fn upsert_object(&mut self, object: &TrackedObject) -> Result<(), IndexError> {
        self.objects.insert(object.uid.clone(), object.clone());
        Ok(())
    }

    fn object_by_uid(&self, uid: &ObjectUid) -> Result<Option<TrackedObject>, IndexError> {
        Ok(self.objects.get(uid).cloned())
    }

    fn object_exists(&self, uid: &ObjectUid) -> Result<bool, IndexError> {
        Ok(self.objects.contains_key(uid))
    }

    fn next_local_id(&self, project: &str, kind: ObjectKind) -> Result<u64, IndexError> {
        let max = self
            .objects
            .values()
            .filter(|o| o.kind == kind && o.project.fullname() == project)
            .map(|o| o.id)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    fn mirror_state(&self, project: &str) -> Result<Option<MirrorRecord>, IndexError> {
        Ok(self.mirrors.get(project).cloned())
    }

    fn set_mirror_targets(&mut self, project: &str, targets: &[String]) -> Result<(), IndexError> {
        let entry = self.mirrors.entry(project.to_string()).or_default();
        entry.targets = targets.to_vec();
        Ok(())
    }

    fn set_mirror_public_key(
        &mut self,
        project: &str,
        key: Option<&str>,
    ) -> Result<(), IndexError> {
        let entry = self.mirrors.entry(project.to_string()).or_default();
        entry.public_key = key.map(str::to_string);
        Ok(())
    }

    fn append_mirror_log(&mut self, project: &str, log: &str) -> Result<(), IndexError> {
        let entry = self.mirrors.entry(project.to_string()).or_default();
        entry.last_log = log.to_string();
        Ok(())
    }
}
