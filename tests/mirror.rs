//! Mirror lifecycle against the on-disk index: setup, collision, teardown,
//! and the skip paths of the periodic task.

use slipway::config::Config;
use slipway::core::Username;
use slipway::index::{Index, ProjectRecord, SqliteIndex};
use slipway::mirror::{self, MirrorError, MirrorOutcome};

struct Env {
    _dir: tempfile::TempDir,
    config: Config,
    index: SqliteIndex,
}

fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.git_folder = dir.path().join("repos");
    config.storage.index_db = dir.path().join("index.sqlite");
    config.mirror.keys_dir = dir.path().join("keys");
    config.mirror.push_timeout_secs = 5;

    let mut index = SqliteIndex::open(&config.storage.index_db).unwrap();
    index
        .upsert_project(&ProjectRecord {
            fullname: "infra/tools".to_string(),
            owner: Username::new("alice").unwrap(),
        })
        .unwrap();

    Env {
        _dir: dir,
        config,
        index,
    }
}

#[test]
fn setup_is_rejected_while_key_material_exists() {
    let mut env = env();

    mirror::setup_mirroring(&env.config, &mut env.index, "infra/tools").unwrap();
    let first = env
        .index
        .mirror_state("infra/tools")
        .unwrap()
        .unwrap()
        .public_key
        .unwrap();
    assert!(first.starts_with("ssh-ed25519 "));

    let err = mirror::setup_mirroring(&env.config, &mut env.index, "infra/tools").unwrap_err();
    assert!(matches!(err, MirrorError::KeyExists(_)));

    // The recorded key is exactly the first call's.
    let still = env
        .index
        .mirror_state("infra/tools")
        .unwrap()
        .unwrap()
        .public_key
        .unwrap();
    assert_eq!(first, still);
}

#[test]
fn teardown_then_setup_provisions_a_fresh_key() {
    let mut env = env();

    mirror::setup_mirroring(&env.config, &mut env.index, "infra/tools").unwrap();
    let first = env
        .index
        .mirror_state("infra/tools")
        .unwrap()
        .unwrap()
        .public_key
        .unwrap();

    mirror::teardown_mirroring(&env.config, &mut env.index, "infra/tools").unwrap();
    assert!(env
        .index
        .mirror_state("infra/tools")
        .unwrap()
        .unwrap()
        .public_key
        .is_none());

    mirror::setup_mirroring(&env.config, &mut env.index, "infra/tools").unwrap();
    let second = env
        .index
        .mirror_state("infra/tools")
        .unwrap()
        .unwrap()
        .public_key
        .unwrap();
    assert_ne!(first, second);
}

#[test]
fn task_skips_until_repository_and_key_exist() {
    let mut env = env();

    // No repository on disk yet.
    let outcome = mirror::mirror_project(&env.config, &mut env.index, "infra/tools").unwrap();
    assert!(matches!(outcome, MirrorOutcome::Skipped(_)));

    // Repository but no key: skip again, and say so in the log.
    std::fs::create_dir_all(env.config.storage.git_folder.join("infra/tools.git")).unwrap();
    let outcome = mirror::mirror_project(&env.config, &mut env.index, "infra/tools").unwrap();
    assert!(matches!(outcome, MirrorOutcome::Skipped(_)));
    let log = env
        .index
        .mirror_state("infra/tools")
        .unwrap()
        .unwrap()
        .last_log;
    assert!(log.contains("Private key not found"));
}

#[test]
fn task_with_no_valid_targets_completes_empty() {
    let mut env = env();

    mirror::setup_mirroring(&env.config, &mut env.index, "infra/tools").unwrap();
    std::fs::create_dir_all(env.config.storage.git_folder.join("infra/tools.git")).unwrap();
    env.index
        .set_mirror_targets(
            "infra/tools",
            &["https://not-ssh.example/mirror.git".to_string()],
        )
        .unwrap();

    // The https target is filtered out; nothing pushed, nothing failed.
    let outcome = mirror::mirror_project(&env.config, &mut env.index, "infra/tools").unwrap();
    assert_eq!(
        outcome,
        MirrorOutcome::Completed {
            pushed: 0,
            failed: 0,
            timed_out: false
        }
    );
}
