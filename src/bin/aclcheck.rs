//! Access gateway for git-over-SSH, one process per inbound connection.
//!
//! sshd invokes this as the forced command with the remote username as the
//! sole argument; the requested operation arrives in SSH_ORIGINAL_COMMAND.
//! On success the process image is replaced by the transport command, so
//! stdout stays untouched for the git protocol. Any failure prints a
//! diagnostic to stderr and exits 1.

use slipway::config;
use slipway::gateway::aclcheck;
use slipway::telemetry;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    telemetry::init(&config.logging, 0);

    let original_command = std::env::var("SSH_ORIGINAL_COMMAND").ok();
    match aclcheck::run(&config, &args, original_command.as_deref()) {
        Ok(handoff) => {
            // exec only returns on failure.
            let err = handoff.exec();
            eprintln!("{err}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
