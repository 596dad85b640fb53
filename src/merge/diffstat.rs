//! Per-file diff statistics.
//!
//! Computed tree-to-tree against the merge-base side, with rename
//! detection, so the reported numbers describe only what the request
//! changes.

use git2::{Delta, DiffFindOptions, Patch, Repository, Tree};
use serde::Serialize;

use super::error::MergeError;

/// One changed file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileDiffStat {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    /// Old blob id (zero for added files).
    pub old_id: String,
    /// New blob id (zero for deleted files).
    pub new_id: String,
    /// Single-letter change type: A, M, D or R.
    pub status: char,
    pub lines_added: usize,
    pub lines_removed: usize,
}

/// Diff two trees; `old_tree` is `None` when the span starts at a root
/// commit.
pub fn stats_between(
    repo: &Repository,
    old_tree: Option<&Tree<'_>>,
    new_tree: &Tree<'_>,
) -> Result<Vec<FileDiffStat>, MergeError> {
    let mut diff = repo.diff_tree_to_tree(old_tree, Some(new_tree), None)?;
    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find))?;

    let mut stats = Vec::new();
    for idx in 0..diff.deltas().len() {
        let delta = diff.get_delta(idx).expect("delta index in range");
        let (lines_added, lines_removed) = match Patch::from_diff(&diff, idx)? {
            Some(patch) => {
                let (_context, additions, deletions) = patch.line_stats()?;
                (additions, deletions)
            }
            // Binary or unrepresentable content: no line counts.
            None => (0, 0),
        };
        stats.push(FileDiffStat {
            old_path: delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned()),
            new_path: delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned()),
            old_id: delta.old_file().id().to_string(),
            new_id: delta.new_file().id().to_string(),
            status: status_code(delta.status()),
            lines_added,
            lines_removed,
        });
    }
    Ok(stats)
}

/// Single-letter change-type code.
fn status_code(status: Delta) -> char {
    match status {
        Delta::Added => 'A',
        Delta::Deleted => 'D',
        Delta::Renamed => 'R',
        _ => 'M',
    }
}
