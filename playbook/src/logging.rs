//! Tracing setup for the playbook binary.
//!
//! `RUST_LOG` takes precedence. Without it the level follows the `-v` count given
//! on the command line, so a re-entered container logs at the same verbosity as
//! the host process that launched it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map a `-v` count to a default filter directive.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize the global subscriber. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=playbook=debug playbook site.yml
/// ```
pub fn init(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
