//! Logging setup.
//!
//! Everything logs through `tracing`; this module installs the subscriber.
//! Output goes to stderr so that `--json` reports on stdout stay parseable.
//!
//! Debug mode can be enabled with the `--debug` flag or `ATELIER_DEBUG=1`.
//! `RUST_LOG`, when set, overrides both.

use tracing_subscriber::EnvFilter;

/// Whether `ATELIER_DEBUG` asks for debug logging.
pub fn debug_from_env() -> bool {
    std::env::var("ATELIER_DEBUG")
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "atelier=debug"
    } else {
        "atelier=info"
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(debug: bool) {
    let debug = debug || debug_from_env();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
