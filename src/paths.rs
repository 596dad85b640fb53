//! Filesystem layout helpers for repositories and key material.

use std::path::PathBuf;

use crate::config::{MirrorConfig, StorageConfig};

/// Path of a project's code repository (bare).
pub fn project_repo_path(storage: &StorageConfig, fullname: &str) -> PathBuf {
    storage.git_folder.join(format!("{fullname}.git"))
}

/// Path of a project's ticket history repository (bare).
pub fn tickets_repo_path(storage: &StorageConfig, fullname: &str) -> PathBuf {
    storage.tickets_folder.join(format!("{fullname}.git"))
}

/// Path of a project's pull-request history repository (bare).
pub fn requests_repo_path(storage: &StorageConfig, fullname: &str) -> PathBuf {
    storage.requests_folder.join(format!("{fullname}.git"))
}

/// Private deploy key path for a project.
///
/// The project fullname is flattened into a single safe filename; the
/// public half lives next to it with a `.pub` suffix.
pub fn mirror_private_key_path(mirror: &MirrorConfig, fullname: &str) -> PathBuf {
    mirror.keys_dir.join(secure_filename(fullname))
}

/// Public deploy key path for a project.
pub fn mirror_public_key_path(mirror: &MirrorConfig, fullname: &str) -> PathBuf {
    mirror.keys_dir.join(format!("{}.pub", secure_filename(fullname)))
}

/// Flatten a project fullname into a filename with no path separators.
///
/// Keeps ASCII alphanumerics, `.`, `_` and `-`; everything else (including
/// `/` between namespace segments) becomes `_`. Leading dots are stripped so
/// the result can never be a hidden or relative path component.
pub fn secure_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_start_matches('.').to_string();
    if trimmed.is_empty() { "_".to_string() } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_filename_flattens_separators() {
        assert_eq!(secure_filename("forks/alice/infra/tools"), "forks_alice_infra_tools");
        assert_eq!(secure_filename("ns/project"), "ns_project");
    }

    #[test]
    fn secure_filename_strips_leading_dots() {
        assert_eq!(secure_filename("../evil"), "_evil");
        assert_eq!(secure_filename("..."), "_");
    }

    #[test]
    fn repo_paths_append_git_suffix() {
        let storage = StorageConfig::default();
        let p = tickets_repo_path(&storage, "ns/project");
        assert!(p.ends_with("ns/project.git"));
    }
}
