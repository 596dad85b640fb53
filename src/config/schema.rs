use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub mirror: MirrorConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

/// Where the bare repositories live.
///
/// Each project has a code repository under `git_folder` and one history
/// repository per tracked-object class under `tickets_folder` and
/// `requests_folder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub git_folder: PathBuf,
    pub tickets_folder: PathBuf,
    pub requests_folder: PathBuf,
    /// SQLite index database path.
    pub index_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            git_folder: PathBuf::from("/srv/slipway/repositories"),
            tickets_folder: PathBuf::from("/srv/slipway/tickets"),
            requests_folder: PathBuf::from("/srv/slipway/requests"),
            index_db: PathBuf::from("/srv/slipway/index.sqlite"),
        }
    }
}

/// Settings for the SSH authorization gateway and key helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the core service, e.g. `https://forge.example/pv`.
    pub api_url: String,
    /// Shared admin token sent as a bearer-style header, if set.
    pub api_token: Option<String>,
    /// Ceiling on each callback request.
    pub timeout_secs: u64,
    pub commands: CommandTemplates,
    /// Environment populated for the delegated command. Values may use the
    /// same `{username}`/`{gitdir}`/`{region}`/`{verb}` placeholders as the
    /// command templates.
    pub env: BTreeMap<String, String>,
    pub keys: KeyHelperConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: None,
            timeout_secs: 30,
            commands: CommandTemplates::default(),
            env: BTreeMap::new(),
            keys: KeyHelperConfig::default(),
        }
    }
}

/// Command templates for handing the connection off to the transport.
///
/// `default` serves repositories on local storage; `region` serves
/// repositories that live in a replicated storage region. Both are argv
/// vectors whose elements may contain substitution placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub default: Vec<String>,
    pub region: Option<Vec<String>>,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            default: vec!["{verb}".to_string(), "{gitdir}".to_string()],
            region: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyHelperConfig {
    /// Whether the presented OS username participates in the lookup.
    pub username_lookup: bool,
    /// The single username git connections are expected to arrive as when
    /// `username_lookup` is off (commonly `git`).
    pub expect_username: Option<String>,
    /// Usernames never served by the key helper.
    pub forbidden_usernames: Vec<String>,
    /// Restriction options prefixed to every printed key line. `{username}`
    /// is substituted with the resolved account name.
    pub key_options: String,
}

impl Default for KeyHelperConfig {
    fn default() -> Self {
        Self {
            username_lookup: false,
            expect_username: Some("git".to_string()),
            forbidden_usernames: vec!["root".to_string()],
            key_options: "restrict,command=\"slipway-aclcheck {username}\"".to_string(),
        }
    }
}

/// Settings for outbound mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Directory holding per-project deploy keys. Must be owned by the
    /// service user, mode 0700, and not a symlink.
    pub keys_dir: PathBuf,
    /// Ceiling on the total push duration per project, across all remotes.
    pub push_timeout_secs: u64,
    /// Wrapper script handed to git as `GIT_SSH`. Written next to the keys
    /// on first use when unset.
    pub ssh_wrapper: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            keys_dir: PathBuf::from("/srv/slipway/keys"),
            push_timeout_secs: 1800,
            ssh_wrapper: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Background worker threads.
    pub workers: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter directive, e.g. `slipway=debug`. The `LOG` env var
    /// takes precedence.
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.gateway.timeout_secs, 30);
        assert_eq!(cfg.jobs.workers, 2);
        assert!(cfg.gateway.commands.region.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [gateway]
            api_url = "https://forge.example/pv"
            timeout_secs = 5

            [gateway.commands]
            default = ["/usr/bin/{verb}", "{gitdir}"]
            region = ["/usr/libexec/region-bridge", "{verb}", "{gitdir}"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.gateway.api_url, "https://forge.example/pv");
        assert_eq!(cfg.gateway.timeout_secs, 5);
        assert_eq!(cfg.gateway.commands.region.as_ref().unwrap().len(), 3);
        // untouched section keeps its default
        assert_eq!(cfg.mirror.push_timeout_secs, 1800);
    }
}
