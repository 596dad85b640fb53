//! Bare repository handle for one tracked-object class of one project.

use std::path::{Path, PathBuf};

use git2::{ObjectType, Oid, Repository, Sort};

use super::error::HistoryError;

/// The single ref all history commits land on.
pub const HISTORY_REF: &str = "refs/heads/master";

/// A bare git repository used purely as an append-only object store.
pub struct HistoryRepo {
    repo: Repository,
    path: PathBuf,
}

impl std::fmt::Debug for HistoryRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRepo")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HistoryRepo {
    /// Open an existing history repository.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let repo = Repository::open_bare(path)
            .map_err(|e| HistoryError::OpenRepo(path.to_path_buf(), e))?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Initialize a new bare history repository (idempotent).
    pub fn init(path: &Path) -> Result<Self, HistoryError> {
        let repo = Repository::init_bare(path)
            .map_err(|e| HistoryError::Init(path.to_path_buf(), e))?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn raw(&self) -> &Repository {
        &self.repo
    }

    /// Current tip of the history ref, if any commits exist.
    pub fn head_oid(&self) -> Option<Oid> {
        self.repo.refname_to_id(HISTORY_REF).ok()
    }

    /// Read the document blob for `file` at the given commit.
    pub fn read_document_at(&self, commit: Oid, file: &str) -> Result<Vec<u8>, HistoryError> {
        let commit = self.repo.find_commit(commit)?;
        let tree = commit.tree()?;
        let entry = tree
            .get_name(file)
            .ok_or_else(|| HistoryError::MissingFile(file.to_string()))?;
        let blob = self
            .repo
            .find_object(entry.id(), Some(ObjectType::Blob))?
            .peel_to_blob()?;
        Ok(blob.content().to_vec())
    }

    /// Read the document blob for `file` at the current tip.
    pub fn read_document(&self, file: &str) -> Result<Vec<u8>, HistoryError> {
        let head = self
            .head_oid()
            .ok_or_else(|| HistoryError::MissingFile(file.to_string()))?;
        self.read_document_at(head, file)
    }

    /// All commits on the history ref, oldest first.
    ///
    /// Replay depends on this order: each document is a full-state snapshot
    /// and a stale one must never overwrite a fresher one.
    pub fn commits_oldest_first(&self) -> Result<Vec<Oid>, HistoryError> {
        let head = match self.head_oid() {
            Some(oid) => oid,
            None => return Ok(Vec::new()),
        };
        let mut walk = self.repo.revwalk()?;
        walk.push(head)?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        let mut commits = Vec::new();
        for oid in walk {
            commits.push(oid?);
        }
        Ok(commits)
    }

    /// File names changed by `commit` relative to its first parent.
    ///
    /// For the initial commit this is every file in its tree.
    pub fn files_changed_in(&self, commit: Oid) -> Result<Vec<String>, HistoryError> {
        let commit = self.repo.find_commit(commit)?;
        let tree = commit.tree()?;

        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut files = Vec::new();
        for delta in diff.deltas() {
            if let Some(path) = delta.new_file().path().and_then(Path::to_str) {
                files.push(path.to_string());
            }
        }
        Ok(files)
    }
}
