//! Mirror setup, teardown, and the periodic push task.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{info, warn};

use super::MirrorError;
use super::keys;
use crate::config::Config;
use crate::index::Index;
use crate::paths;

/// Wrapper script written next to the keys when none is configured. Git
/// invokes it instead of ssh; `SSHKEY` selects the project's deploy key.
const SSH_WRAPPER: &str = "#!/bin/sh\nexec ssh -i \"$SSHKEY\" -o IdentitiesOnly=yes \"$@\"\n";

/// Only ssh remotes are mirrored; anything else in the target list is
/// operator error and is ignored.
fn ssh_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ssh://(\S+@)?\S+$").expect("static regex"))
}

/// What the periodic task did for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Nothing to do (missing repository or key); not a failure.
    Skipped(String),
    Completed {
        pushed: usize,
        failed: usize,
        /// The push-duration ceiling cut the run short.
        timed_out: bool,
    },
}

/// Provision the deploy key for a project and record the public half.
///
/// Fails if any key material already exists — regeneration requires an
/// explicit teardown first, so a running mirror's key can never be
/// silently replaced.
pub fn setup_mirroring(
    config: &Config,
    index: &mut dyn Index,
    project: &str,
) -> Result<(), MirrorError> {
    if index.project_by_fullname(project)?.is_none() {
        return Err(MirrorError::UnknownProject(project.to_string()));
    }

    keys::ensure_keys_dir(&config.mirror.keys_dir)?;
    let private_path = paths::mirror_private_key_path(&config.mirror, project);
    let public_key = keys::create_keypair(&private_path, project)?;
    index.set_mirror_public_key(project, Some(&public_key))?;
    info!(project, "mirroring configured");
    Ok(())
}

/// Remove the deploy key and clear the recorded public half.
pub fn teardown_mirroring(
    config: &Config,
    index: &mut dyn Index,
    project: &str,
) -> Result<(), MirrorError> {
    let private_path = paths::mirror_private_key_path(&config.mirror, project);
    keys::remove_keypair(&private_path)?;
    index.set_mirror_public_key(project, None)?;
    info!(project, "mirroring removed");
    Ok(())
}

/// Force-push the project's code repository to every configured remote.
///
/// Pushes run in sequence under a total duration ceiling; partial results
/// (some remotes pushed, others not) are recorded in the project's rolling
/// log field either way.
pub fn mirror_project(
    config: &Config,
    index: &mut dyn Index,
    project: &str,
) -> Result<MirrorOutcome, MirrorError> {
    let repopath = paths::project_repo_path(&config.storage, project);
    if !repopath.exists() {
        warn!(project, path = %repopath.display(), "git repository not found, bailing");
        return Ok(MirrorOutcome::Skipped("git repository not found".into()));
    }

    let private_key = paths::mirror_private_key_path(&config.mirror, project);
    if !private_key.exists() {
        warn!(project, "private key not found, bailing");
        index.append_mirror_log(project, "Private key not found on disk, bailing")?;
        return Ok(MirrorOutcome::Skipped("private key not found".into()));
    }

    let wrapper = ensure_ssh_wrapper(&config.mirror.keys_dir, config.mirror.ssh_wrapper.as_deref())?;

    let remotes: Vec<String> = index
        .mirror_state(project)?
        .map(|state| state.targets)
        .unwrap_or_default()
        .into_iter()
        .filter(|remote| ssh_url_re().is_match(remote))
        .collect();

    let deadline = Instant::now() + Duration::from_secs(config.mirror.push_timeout_secs);
    let mut logs = Vec::new();
    let mut pushed = 0;
    let mut failed = 0;
    let mut timed_out = false;

    for remote in &remotes {
        if Instant::now() >= deadline {
            timed_out = true;
            logs.push(format!(
                "Push budget exhausted before {remote}; remaining remotes skipped"
            ));
            break;
        }
        info!(project, remote = %remote, "pushing mirror");
        match push_remote(&repopath, remote, &private_key, &wrapper, deadline) {
            Ok(PushResult { success, output }) => {
                if success {
                    pushed += 1;
                } else {
                    failed += 1;
                }
                logs.push(format!("Output from the push to {remote}:\n{output}"));
            }
            Err(e) => {
                failed += 1;
                logs.push(format!("Push to {remote} could not run: {e}"));
            }
        }
    }

    if !logs.is_empty() {
        index.append_mirror_log(project, &logs.join("\n"))?;
    }
    Ok(MirrorOutcome::Completed {
        pushed,
        failed,
        timed_out,
    })
}

struct PushResult {
    success: bool,
    output: String,
}

/// Run `git push --mirror <remote>` with the deploy key, killed at the
/// deadline.
fn push_remote(
    repopath: &Path,
    remote: &str,
    private_key: &Path,
    wrapper: &Path,
    deadline: Instant,
) -> Result<PushResult, MirrorError> {
    let mut child = Command::new("git")
        .arg("push")
        .arg("--mirror")
        .arg(remote)
        .current_dir(repopath)
        .env("SSHKEY", private_key)
        .env("GIT_SSH", wrapper)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            break None;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        output.push_str(&format!("  stdout: {buf}"));
    }
    if let Some(mut stderr) = child.stderr.take() {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        output.push_str(&format!("\n  stderr: {buf}"));
    }

    match status {
        Some(status) => Ok(PushResult {
            success: status.success(),
            output,
        }),
        None => Ok(PushResult {
            success: false,
            output: format!("{output}\n  (killed: push deadline exceeded)"),
        }),
    }
}

/// Resolve the `GIT_SSH` wrapper, writing the default one on first use.
fn ensure_ssh_wrapper(
    keys_dir: &Path,
    configured: Option<&Path>,
) -> Result<PathBuf, MirrorError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let path = keys_dir.join("ssh_wrapper.sh");
    if !path.exists() {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&path)?;
        file.write_all(SSH_WRAPPER.as_bytes())?;
    }
    Ok(path)
}
