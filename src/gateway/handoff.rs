//! Authorize, then hand off process control.
//!
//! Once a connection is authorized, the gateway builds the transport
//! command from the configured template for the repository's storage
//! region and replaces its own process image with it. On success there is
//! no return to the caller.

use std::collections::BTreeMap;
use std::os::unix::process::CommandExt;
use std::process::Command;

use super::GatewayError;

/// A fully substituted command plus environment, ready to exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Handoff {
    /// Build from an argv template and environment template, applying the
    /// same substitution map to both.
    pub fn from_templates(
        argv: &[String],
        env: &BTreeMap<String, String>,
        vars: &BTreeMap<&str, String>,
    ) -> Result<Self, GatewayError> {
        if argv.is_empty() {
            return Err(GatewayError::Config("empty command template".into()));
        }
        Ok(Self {
            argv: argv.iter().map(|arg| substitute(arg, vars)).collect(),
            env: env
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, vars)))
                .collect(),
        })
    }

    /// Replace the current process image. Only returns on failure.
    pub fn exec(self) -> GatewayError {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        GatewayError::Exec(cmd.exec())
    }
}

/// Replace `{name}` placeholders with values from the map.
///
/// Unknown placeholders are left untouched so a template typo shows up
/// verbatim in diagnostics instead of silently vanishing.
pub fn substitute(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
