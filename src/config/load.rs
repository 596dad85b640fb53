use std::fs;
use std::path::{Path, PathBuf};

use super::Config;
use crate::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "/etc/slipway/config.toml";

/// Resolve the configuration file path.
///
/// The gateway processes are launched by sshd with a scrubbed environment,
/// so `SLIPWAY_CONFIG` is consulted first and the well-known system path is
/// the fallback, mirroring how the daemons are deployed.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SLIPWAY_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Load configuration from the resolved path.
///
/// A missing file yields defaults; a present-but-invalid file is a hard
/// error (configuration errors are fatal at process start).
pub fn load() -> Result<Config> {
    let path = config_path();
    if !path.exists() {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        return Ok(cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply environment overrides on top of the file layer.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(url) = std::env::var("SLIPWAY_API_URL")
        && !url.trim().is_empty()
    {
        cfg.gateway.api_url = url;
    }
    if let Ok(token) = std::env::var("SLIPWAY_API_TOKEN")
        && !token.trim().is_empty()
    {
        cfg.gateway.api_token = Some(token);
    }
    if let Ok(dir) = std::env::var("SLIPWAY_GIT_FOLDER")
        && !dir.trim().is_empty()
    {
        cfg.storage.git_folder = PathBuf::from(dir);
    }
    if let Ok(db) = std::env::var("SLIPWAY_INDEX_DB")
        && !db.trim().is_empty()
    {
        cfg.storage.index_db = PathBuf::from(db);
    }
}
