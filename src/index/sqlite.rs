//! SQLite-backed index.
//!
//! Objects are stored as a JSON projection plus a few indexed columns; the
//! dependency edges are additionally broken out into their own table so the
//! service can query "what blocks X" without decoding documents. The whole
//! database is disposable: a full replay of the history repositories
//! rebuilds it from scratch.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use super::{Index, IndexError, MirrorRecord, ProjectRecord, UserRecord};
use crate::core::{ObjectKind, ObjectUid, TrackedObject, Username};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    fullname TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS projects (
    fullname TEXT PRIMARY KEY,
    owner TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS objects (
    uid TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    project TEXT NOT NULL,
    local_id INTEGER NOT NULL,
    doc TEXT NOT NULL,
    UNIQUE (project, kind, local_id)
);
CREATE TABLE IF NOT EXISTS deps (
    from_uid TEXT NOT NULL,
    to_uid TEXT NOT NULL,
    direction TEXT NOT NULL,
    PRIMARY KEY (from_uid, to_uid, direction)
);
CREATE TABLE IF NOT EXISTS mirrors (
    project TEXT PRIMARY KEY,
    targets TEXT NOT NULL DEFAULT '',
    public_key TEXT,
    last_log TEXT NOT NULL DEFAULT ''
);
";

pub struct SqliteIndex {
    conn: Connection,
}

impl SqliteIndex {
    /// Open (and migrate) the index database at `path`.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl Index for SqliteIndex {
    fn upsert_user(&mut self, user: &UserRecord) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO users (username, fullname) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET fullname = excluded.fullname",
            params![user.username.as_str(), user.fullname],
        )?;
        Ok(())
    }

    fn user_by_name(&self, username: &str) -> Result<Option<UserRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT username, fullname FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((username, fullname)) => Ok(Some(UserRecord {
                username: Username::new(username)?,
                fullname,
            })),
        }
    }

    fn upsert_project(&mut self, project: &ProjectRecord) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO projects (fullname, owner) VALUES (?1, ?2)
             ON CONFLICT(fullname) DO UPDATE SET owner = excluded.owner",
            params![project.fullname, project.owner.as_str()],
        )?;
        Ok(())
    }

    fn project_by_fullname(&self, fullname: &str) -> Result<Option<ProjectRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT fullname, owner FROM projects WHERE fullname = ?1",
                params![fullname],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((fullname, owner)) => Ok(Some(ProjectRecord {
                fullname,
                owner: Username::new(owner)?,
            })),
        }
    }

    fn upsert_object(&mut self, object: &TrackedObject) -> Result<(), IndexError> {
        let doc = serde_json::to_string(object)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO objects (uid, kind, project, local_id, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(uid) DO UPDATE SET
                 kind = excluded.kind,
                 project = excluded.project,
                 local_id = excluded.local_id,
                 doc = excluded.doc",
            params![
                object.uid.as_str(),
                object.kind.as_str(),
                object.project.fullname(),
                object.id,
                doc
            ],
        )?;
        tx.execute(
            "DELETE FROM deps WHERE from_uid = ?1",
            params![object.uid.as_str()],
        )?;
        for to in &object.depends {
            tx.execute(
                "INSERT OR IGNORE INTO deps (from_uid, to_uid, direction) VALUES (?1, ?2, 'depends_on')",
                params![object.uid.as_str(), to.as_str()],
            )?;
        }
        for to in &object.blocks {
            tx.execute(
                "INSERT OR IGNORE INTO deps (from_uid, to_uid, direction) VALUES (?1, ?2, 'blocks')",
                params![object.uid.as_str(), to.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn object_by_uid(&self, uid: &ObjectUid) -> Result<Option<TrackedObject>, IndexError> {
        let doc = self
            .conn
            .query_row(
                "SELECT doc FROM objects WHERE uid = ?1",
                params![uid.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match doc {
            None => Ok(None),
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
        }
    }

    fn object_exists(&self, uid: &ObjectUid) -> Result<bool, IndexError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM objects WHERE uid = ?1",
                params![uid.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn next_local_id(&self, project: &str, kind: ObjectKind) -> Result<u64, IndexError> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(local_id), 0) FROM objects WHERE project = ?1 AND kind = ?2",
            params![project, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(max as u64 + 1)
    }

    fn mirror_state(&self, project: &str) -> Result<Option<MirrorRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT targets, public_key, last_log FROM mirrors WHERE project = ?1",
                params![project],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(targets, public_key, last_log)| MirrorRecord {
            targets: targets
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            public_key,
            last_log,
        }))
    }

    fn set_mirror_targets(&mut self, project: &str, targets: &[String]) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO mirrors (project, targets) VALUES (?1, ?2)
             ON CONFLICT(project) DO UPDATE SET targets = excluded.targets",
            params![project, targets.join("\n")],
        )?;
        Ok(())
    }

    fn set_mirror_public_key(
        &mut self,
        project: &str,
        key: Option<&str>,
    ) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO mirrors (project, public_key) VALUES (?1, ?2)
             ON CONFLICT(project) DO UPDATE SET public_key = excluded.public_key",
            params![project, key],
        )?;
        Ok(())
    }

    fn append_mirror_log(&mut self, project: &str, log: &str) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT INTO mirrors (project, last_log) VALUES (?1, ?2)
             ON CONFLICT(project) DO UPDATE SET last_log = excluded.last_log",
            params![project, log],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProjectRef;
    use time::macros::datetime;

    fn ticket(project: &str, id: u64) -> TrackedObject {
        let mut obj = TrackedObject::new_ticket(
            ProjectRef::new(project),
            id,
            format!("ticket {id}"),
            "body",
            Username::new("alice").unwrap(),
            datetime!(2026-01-01 00:00:00 UTC),
        );
        obj.id = id;
        obj
    }

    #[test]
    fn object_roundtrip() {
        let mut index = SqliteIndex::open_in_memory().unwrap();
        let mut obj = ticket("tools", 1);
        obj.tags.insert("bug".into());
        let other = ObjectUid::generate();
        obj.add_depends(other.clone()).unwrap();

        index.upsert_object(&obj).unwrap();
        let loaded = index.object_by_uid(&obj.uid).unwrap().unwrap();
        assert_eq!(loaded, obj);
        assert!(index.object_exists(&obj.uid).unwrap());
        assert!(!index.object_exists(&other).unwrap());
    }

    #[test]
    fn upsert_replaces_edges() {
        let mut index = SqliteIndex::open_in_memory().unwrap();
        let mut obj = ticket("tools", 1);
        obj.add_depends(ObjectUid::generate()).unwrap();
        index.upsert_object(&obj).unwrap();

        obj.depends.clear();
        index.upsert_object(&obj).unwrap();
        let n: i64 = index
            .conn
            .query_row("SELECT COUNT(*) FROM deps", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn mirror_state_roundtrip() {
        let mut index = SqliteIndex::open_in_memory().unwrap();
        assert!(index.mirror_state("tools").unwrap().is_none());

        index
            .set_mirror_targets("tools", &["ssh://git@example.com/mirror.git".to_string()])
            .unwrap();
        index.set_mirror_public_key("tools", Some("ssh-ed25519 AAAA...")).unwrap();
        index.append_mirror_log("tools", "pushed").unwrap();

        let state = index.mirror_state("tools").unwrap().unwrap();
        assert_eq!(state.targets.len(), 1);
        assert_eq!(state.public_key.as_deref(), Some("ssh-ed25519 AAAA..."));
        assert_eq!(state.last_log, "pushed");
    }
}
