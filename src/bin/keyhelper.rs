//! Key lookup helper for sshd (AuthorizedKeysCommand).
//!
//! Prints a single authorized-keys line when the presented key resolves to
//! an account. An unknown key is a legitimate outcome: empty output, exit
//! 0, and sshd moves on to its other lookup sources.

use slipway::config;
use slipway::gateway::keyhelper;
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

    match keyhelper::run(&config, &args) {
        Ok(Some(line)) => println!("{line}"),
        Ok(None) => {}
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
