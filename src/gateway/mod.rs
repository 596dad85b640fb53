//! Out-of-band SSH gateway.
//!
//! Two single-shot processes launched by sshd, one per inbound connection:
//!
//! - `aclcheck` parses the requested git operation, asks the core service
//!   for an access + routing decision, and execs the transport command for
//!   the right storage region.
//! - `keyhelper` resolves a presented public key to an account and prints
//!   an authorized-keys line.
//!
//! Both hold no local state, never cache decisions, and fail closed on any
//! doubt. Stdout is reserved for the delegated command / key output;
//! diagnostics go to stderr only.

pub mod aclcheck;
pub mod client;
pub mod handoff;
pub mod keyhelper;

use thiserror::Error;

use crate::error::{Effect, Transience};

/// The externally visible denial. Identical for a repository that does not
/// exist and one the caller cannot access, so existence never leaks.
pub const DENIED_MESSAGE: &str = "Repo not found";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Malformed invocation (argument count, verb, path quoting).
    #[error("Invalid call: {0}")]
    Usage(String),

    /// Denied, repository unknown, or the callback could not give a
    /// definitive yes. One message for all of them.
    #[error("Repo not found")]
    Denied,

    /// The key helper refuses to serve this OS user.
    #[error("user {0} is forbidden for key lookup")]
    ForbiddenUser(String),

    /// Gateway configuration is unusable; fatal at process start.
    #[error("gateway configuration error: {0}")]
    Config(String),

    /// The callback transport failed. Fails closed.
    #[error("authorization callback failed: {0}")]
    Callback(#[source] reqwest::Error),

    /// `exec` of the transport command came back.
    #[error("failed to exec transport command: {0}")]
    Exec(#[source] std::io::Error),
}

impl GatewayError {
    pub fn transience(&self) -> Transience {
        match self {
            GatewayError::Callback(_) => Transience::Retryable,
            GatewayError::Usage(_)
            | GatewayError::Denied
            | GatewayError::ForbiddenUser(_)
            | GatewayError::Config(_) => Transience::Permanent,
            GatewayError::Exec(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        // The gateway mutates nothing; at worst a callback reached the
        // service, which is read-only on its side.
        Effect::None
    }
}
