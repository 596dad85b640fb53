//! Gateway process contract: exit codes, stream discipline, fail-closed
//! behavior. Exercises the real binaries the way sshd invokes them.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

/// Config pointing the callback at a port nothing listens on: every
/// authorization attempt fails at the transport and must deny.
fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        r#"
[gateway]
api_url = "http://127.0.0.1:1/pv"
timeout_secs = 1
"#,
    )
    .unwrap();
    path
}

fn aclcheck(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("slipway-aclcheck").unwrap();
    cmd.env_clear()
        .env("SLIPWAY_CONFIG", config)
        .env("PATH", std::env::var("PATH").unwrap_or_default());
    cmd
}

fn keyhelper(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("slipway-keyhelper").unwrap();
    cmd.env_clear()
        .env("SLIPWAY_CONFIG", config)
        .env("PATH", std::env::var("PATH").unwrap_or_default());
    cmd
}

#[test]
fn aclcheck_rejects_missing_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    aclcheck(&config)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Invalid call"));
}

#[test]
fn aclcheck_rejects_missing_original_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    aclcheck(&config)
        .arg("alice")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid call"));
}

#[test]
fn aclcheck_rejects_unknown_verb() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    aclcheck(&config)
        .arg("alice")
        .env("SSH_ORIGINAL_COMMAND", "git-annex 'tools.git'")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Invalid call"));
}

#[test]
fn aclcheck_rejects_unquoted_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    aclcheck(&config)
        .arg("alice")
        .env("SSH_ORIGINAL_COMMAND", "git-upload-pack tools.git")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid call"));
}

#[test]
fn denied_push_never_reaches_the_transport() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    // The callback is unreachable, so this denies; stdout must stay empty
    // (it belongs to the transport, which must never start).
    aclcheck(&config)
        .arg("alice")
        .env("SSH_ORIGINAL_COMMAND", "git-receive-pack 'tools.git'")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Repo not found"));
}

#[test]
fn aclcheck_without_api_url_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    aclcheck(&path)
        .arg("alice")
        .env("SSH_ORIGINAL_COMMAND", "git-upload-pack 'tools.git'")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn keyhelper_rejects_missing_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    keyhelper(&config)
        .args(["git", "/home/git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid call"));
}

#[test]
fn keyhelper_forbidden_user_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    keyhelper(&config)
        .args(["root", "/root", "ssh-ed25519", "SHA256:abc"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn keyhelper_unexpected_user_exits_zero_and_silent() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    // Default config expects the `git` user; other accounts are simply not
    // ours to answer for.
    keyhelper(&config)
        .args(["postgres", "/var/lib/pgsql", "ssh-ed25519", "SHA256:abc"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn keyhelper_fails_closed_when_service_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    keyhelper(&config)
        .args(["git", "/home/git", "ssh-ed25519", "SHA256:abc"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}
