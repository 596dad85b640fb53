//! Tracing initialization.
//!
//! All binaries log to stderr: the gateway processes must keep stdout
//! untouched for the delegated transport command.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global subscriber.
///
/// Filter precedence: `LOG` env var, then the configured directive, then a
/// verbosity-derived default. Safe to call once per process; later calls
/// are ignored.
pub fn init(logging: &LoggingConfig, verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let directive = logging.filter.as_deref().unwrap_or(default);

    let filter = EnvFilter::builder()
        .with_env_var("LOG")
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
