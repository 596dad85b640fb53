//! Key lookup for sshd's AuthorizedKeysCommand.
//!
//! Invoked as `slipway-keyhelper <username> <home> <keytype> <fingerprint>`
//! (sshd config: `AuthorizedKeysCommand <path> "%u" "%h" "%t" "%f"`). The
//! home directory and key type are accepted for forward compatibility but
//! not used in the lookup today.
//!
//! "Key not found" is a legitimate outcome, not an error: the process
//! prints nothing and exits 0 so sshd keeps trying its other sources.

use std::collections::BTreeMap;

use tracing::debug;

use super::GatewayError;
use super::client::CoreClient;
use super::handoff::substitute;
use crate::config::Config;

/// Run the lookup.
///
/// Returns the single authorized-keys line to print, or `None` for the
/// benign no-result case.
pub fn run(config: &Config, args: &[String]) -> Result<Option<String>, GatewayError> {
    if args.len() < 5 {
        return Err(GatewayError::Usage("too few arguments".into()));
    }
    let (username, _home, _keytype, fingerprint) = (&args[1], &args[2], &args[3], &args[4]);
    let keys_cfg = &config.gateway.keys;

    if keys_cfg
        .forbidden_usernames
        .iter()
        .any(|forbidden| forbidden == username)
    {
        return Err(GatewayError::ForbiddenUser(username.clone()));
    }

    if !keys_cfg.username_lookup {
        let Some(expected) = &keys_cfg.expect_username else {
            return Err(GatewayError::Config(
                "key helper needs username_lookup or expect_username".into(),
            ));
        };
        if username != expected {
            // Not a git-related login; nothing to contribute.
            return Ok(None);
        }
    }

    let client = CoreClient::new(&config.gateway)?;
    let lookup_username = keys_cfg.username_lookup.then_some(username.as_str());
    let lookup = match client.lookup_key(fingerprint, lookup_username) {
        Ok(lookup) => lookup,
        Err(GatewayError::Config(msg)) => return Err(GatewayError::Config(msg)),
        // Fail closed: an unreachable service authorizes nobody.
        Err(_) => return Err(GatewayError::Denied),
    };

    if !lookup.found {
        debug!(fingerprint = %fingerprint, "key not known");
        return Ok(None);
    }
    let public_key = lookup.public_key.ok_or(GatewayError::Denied)?;
    let resolved = lookup.username.ok_or(GatewayError::Denied)?;

    let vars = BTreeMap::from([("username", resolved)]);
    let options = substitute(&keys_cfg.key_options, &vars);
    Ok(Some(format!("{options} {public_key}")))
}
