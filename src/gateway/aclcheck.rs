//! Access control check for inbound git-over-SSH connections.
//!
//! Invoked by sshd as `slipway-aclcheck <remote-username>` with the
//! requested operation in `SSH_ORIGINAL_COMMAND`. Every validation step is
//! a hard failure; the callback decides both access and routing; on
//! success the process execs the transport command and never returns.

use std::collections::BTreeMap;

use tracing::debug;

use super::GatewayError;
use super::client::CoreClient;
use super::handoff::Handoff;
use crate::config::Config;

/// The two git transport operations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    UploadPack,
    ReceivePack,
}

impl Verb {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Verb::UploadPack),
            "git-receive-pack" => Some(Verb::ReceivePack),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::UploadPack => "git-upload-pack",
            Verb::ReceivePack => "git-receive-pack",
        }
    }
}

/// A validated, normalized operation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    /// Repository path, unquoted, relative, with the `.git` suffix.
    pub path: String,
}

/// Parse and validate `SSH_ORIGINAL_COMMAND`.
///
/// Expects `<git-(receive|upload)-pack> '<repopath>'`, quoted exactly as
/// the git client quotes it.
pub fn parse_operation(raw: &str) -> Result<Operation, GatewayError> {
    let args: Vec<&str> = raw.split(' ').collect();
    if args.len() != 2 {
        return Err(GatewayError::Usage("too few inner arguments".into()));
    }

    let verb = Verb::parse(args[0])
        .ok_or_else(|| GatewayError::Usage("invalid operation".into()))?;

    let quoted = args[1];
    if quoted.len() < 2 || !quoted.starts_with('\'') || !quoted.ends_with('\'') {
        return Err(GatewayError::Usage("invalid path".into()));
    }
    let mut path = quoted[1..quoted.len() - 1].to_string();

    // Clients may send an absolute-looking path; serve it relative to the
    // storage root rather than rejecting round-tripped URLs.
    while path.starts_with('/') {
        path.remove(0);
    }
    if path.is_empty() {
        return Err(GatewayError::Usage("invalid path".into()));
    }
    if !path.ends_with(".git") {
        path.push_str(".git");
    }

    Ok(Operation { verb, path })
}

/// Run the full check: validate, authorize, prepare the handoff.
///
/// `args` is the process argv (program name included). The returned
/// `Handoff` is ready to exec; any error means deny and exit non-zero.
pub fn run(
    config: &Config,
    args: &[String],
    original_command: Option<&str>,
) -> Result<Handoff, GatewayError> {
    if args.len() != 2 {
        return Err(GatewayError::Usage("too few arguments".into()));
    }
    let remote_user = &args[1];

    let raw = original_command
        .ok_or_else(|| GatewayError::Usage("SSH_ORIGINAL_COMMAND not set".into()))?;
    let op = parse_operation(raw)?;
    debug!(user = %remote_user, verb = op.verb.as_str(), path = %op.path, "authorizing");

    let client = CoreClient::new(&config.gateway)?;
    let decision = match client.check_access(&op.path, remote_user) {
        Ok(decision) => decision,
        // Fail closed: a callback we cannot complete is a denial.
        Err(GatewayError::Config(msg)) => return Err(GatewayError::Config(msg)),
        Err(_) => return Err(GatewayError::Denied),
    };
    if !decision.access {
        return Err(GatewayError::Denied);
    }

    let gitdir = config
        .storage
        .git_folder
        .join(&op.path)
        .to_string_lossy()
        .into_owned();
    let vars = BTreeMap::from([
        ("username", remote_user.clone()),
        ("gitdir", gitdir),
        ("verb", op.verb.as_str().to_string()),
        ("region", decision.region.clone().unwrap_or_default()),
    ]);

    let template = match &decision.region {
        Some(_) => config
            .gateway
            .commands
            .region
            .as_ref()
            .ok_or_else(|| {
                GatewayError::Config("no region command template configured".into())
            })?,
        None => &config.gateway.commands.default,
    };

    Handoff::from_templates(template, &config.gateway.env, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wellformed_command() {
        let op = parse_operation("git-upload-pack 'tools.git'").unwrap();
        assert_eq!(op.verb, Verb::UploadPack);
        assert_eq!(op.path, "tools.git");
    }

    #[test]
    fn appends_git_suffix() {
        let op = parse_operation("git-receive-pack 'infra/tools'").unwrap();
        assert_eq!(op.path, "infra/tools.git");
    }

    #[test]
    fn strips_leading_separator() {
        let op = parse_operation("git-upload-pack '/infra/tools.git'").unwrap();
        assert_eq!(op.path, "infra/tools.git");
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(parse_operation("git-upload-pack").is_err());
        assert!(parse_operation("git-upload-pack 'a.git' extra").is_err());
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(parse_operation("git-push 'tools.git'").is_err());
        assert!(parse_operation("rm -rf").is_err());
    }

    #[test]
    fn rejects_unquoted_path() {
        assert!(parse_operation("git-upload-pack tools.git").is_err());
        assert!(parse_operation("git-upload-pack 'tools.git").is_err());
        assert!(parse_operation("git-upload-pack ''").is_err());
    }

    #[test]
    fn run_rejects_wrong_argc() {
        let config = Config::default();
        let err = run(&config, &["slipway-aclcheck".to_string()], None).unwrap_err();
        assert!(matches!(err, GatewayError::Usage(_)));
    }

    #[test]
    fn run_requires_original_command() {
        let config = Config::default();
        let args = vec!["slipway-aclcheck".to_string(), "alice".to_string()];
        let err = run(&config, &args, None).unwrap_err();
        assert!(matches!(err, GatewayError::Usage(_)));
    }

    #[test]
    fn unreachable_callback_denies() {
        let mut config = Config::default();
        config.gateway.api_url = "http://127.0.0.1:1/pv".into();
        config.gateway.timeout_secs = 1;
        let args = vec!["slipway-aclcheck".to_string(), "alice".to_string()];
        let err = run(&config, &args, Some("git-upload-pack 'tools.git'")).unwrap_err();
        assert!(matches!(err, GatewayError::Denied));
    }
}
