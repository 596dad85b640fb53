//! Deploy key material.
//!
//! One ed25519 keypair per mirrored project: the private half stays on the
//! filesystem (0600, created with O_EXCL), the public half is serialized
//! into the OpenSSH wire format and recorded in the index so operators can
//! paste it into the receiving side.

use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tracing::info;

use super::MirrorError;

/// Validate (or create) the shared key directory.
///
/// Checks are idempotent and replace locking: setup is rare, and a
/// directory that fails them is reported as-is — no chmod-and-continue.
pub fn ensure_keys_dir(dir: &Path) -> Result<(), MirrorError> {
    if !dir.exists() {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
        return Ok(());
    }

    let meta = fs::symlink_metadata(dir)?;
    if meta.file_type().is_symlink() {
        return Err(MirrorError::FolderIsSymlink(dir.to_path_buf()));
    }
    let mode = meta.mode() & 0o777;
    if mode != 0o700 {
        return Err(MirrorError::FolderPermissions {
            path: dir.to_path_buf(),
            mode,
        });
    }
    if meta.uid() != process_uid() || meta.gid() != process_gid() {
        return Err(MirrorError::FolderOwnership(dir.to_path_buf()));
    }
    Ok(())
}

/// Generate a keypair at `private_path` (+ `.pub`), returning the encoded
/// public key.
///
/// Refuses to touch anything if either file — or a stray artifact at
/// either path — already exists; regeneration requires teardown first.
pub fn create_keypair(private_path: &Path, comment: &str) -> Result<String, MirrorError> {
    let public_path = public_path_for(private_path);
    if private_path.exists() || public_path.exists() {
        return Err(MirrorError::KeyExists(private_path.to_path_buf()));
    }

    let signing = SigningKey::generate(&mut OsRng);
    let pem = signing
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| MirrorError::Key(e.to_string()))?;

    let mut private = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(private_path)?;
    private.write_all(pem.as_bytes())?;

    let public_key = encode_openssh_public(&signing.verifying_key(), comment);
    let mut public = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(&public_path)?;
    public.write_all(public_key.as_bytes())?;
    public.write_all(b"\n")?;

    info!(path = %private_path.display(), "deploy key created");
    Ok(public_key)
}

/// Remove both halves of a keypair. Missing files are fine.
pub fn remove_keypair(private_path: &Path) -> Result<(), MirrorError> {
    let public_path = public_path_for(private_path);
    if private_path.exists() {
        fs::remove_file(private_path)?;
    }
    if public_path.exists() {
        fs::remove_file(&public_path)?;
    }
    Ok(())
}

/// OpenSSH wire encoding of an ed25519 public key:
/// `ssh-ed25519 <base64(string "ssh-ed25519" + string keybytes)> <comment>`.
pub fn encode_openssh_public(key: &VerifyingKey, comment: &str) -> String {
    let mut wire = Vec::with_capacity(4 + 11 + 4 + 32);
    ssh_write_string(&mut wire, b"ssh-ed25519");
    ssh_write_string(&mut wire, key.as_bytes());
    format!("ssh-ed25519 {} {}", BASE64.encode(&wire), comment)
}

/// SSH wire strings are length-prefixed with a big-endian u32.
fn ssh_write_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

fn public_path_for(private_path: &Path) -> std::path::PathBuf {
    let mut name = private_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".pub");
    private_path.with_file_name(name)
}

fn process_uid() -> u32 {
    // SAFETY: getuid has no failure modes and touches no memory.
    unsafe { libc::getuid() }
}

fn process_gid() -> u32 {
    // SAFETY: getgid has no failure modes and touches no memory.
    unsafe { libc::getgid() }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn creates_dir_with_owner_only_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("keys");
        ensure_keys_dir(&dir).unwrap();
        let mode = fs::metadata(&dir).unwrap().mode() & 0o777;
        assert_eq!(mode, 0o700);
        // Second call validates instead of failing.
        ensure_keys_dir(&dir).unwrap();
    }

    #[test]
    fn rejects_wrong_mode_without_repairing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("keys");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let err = ensure_keys_dir(&dir).unwrap_err();
        assert!(matches!(err, MirrorError::FolderPermissions { .. }));
        // Mode untouched.
        assert_eq!(fs::metadata(&dir).unwrap().mode() & 0o777, 0o755);
    }

    #[test]
    fn rejects_symlinked_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = tmp.path().join("keys");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let err = ensure_keys_dir(&link).unwrap_err();
        assert!(matches!(err, MirrorError::FolderIsSymlink(_)));
    }

    #[test]
    fn keypair_roundtrip_and_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let private = tmp.path().join("infra_tools");

        let public = create_keypair(&private, "infra/tools").unwrap();
        assert!(public.starts_with("ssh-ed25519 "));
        assert!(public.ends_with(" infra/tools"));
        assert_eq!(
            fs::metadata(&private).unwrap().mode() & 0o777,
            0o600
        );

        // Second setup without teardown must fail and not touch the files.
        let before = fs::read(&private).unwrap();
        let err = create_keypair(&private, "infra/tools").unwrap_err();
        assert!(matches!(err, MirrorError::KeyExists(_)));
        assert_eq!(fs::read(&private).unwrap(), before);

        remove_keypair(&private).unwrap();
        assert!(!private.exists());
        assert!(!public_path_for(&private).exists());
        // Teardown twice is fine.
        remove_keypair(&private).unwrap();
    }

    #[test]
    fn stray_public_artifact_blocks_setup() {
        let tmp = tempfile::tempdir().unwrap();
        let private = tmp.path().join("tools");
        fs::write(public_path_for(&private), "junk").unwrap();

        let err = create_keypair(&private, "tools").unwrap_err();
        assert!(matches!(err, MirrorError::KeyExists(_)));
    }

    #[test]
    fn openssh_encoding_shape() {
        let signing = SigningKey::generate(&mut OsRng);
        let line = encode_openssh_public(&signing.verifying_key(), "c");
        let parts: Vec<&str> = line.split(' ').collect();
        assert_eq!(parts.len(), 3);
        let wire = BASE64.decode(parts[1]).unwrap();
        // string "ssh-ed25519" + string key(32)
        assert_eq!(&wire[..4], &11u32.to_be_bytes());
        assert_eq!(&wire[4..15], b"ssh-ed25519");
        assert_eq!(&wire[15..19], &32u32.to_be_bytes());
        assert_eq!(wire.len(), 19 + 32);
    }
}
