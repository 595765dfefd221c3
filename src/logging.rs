//! Tracing subscriber setup.
//!
//! - `RUST_LOG` overrides the filter
//! - default level is INFO, WARN when quiet
//! - JSON lines when `RUST_LOG_FORMAT=json`

use tracing_subscriber::EnvFilter;

fn default_filter(quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("expeditious=warn")
    } else {
        EnvFilter::new("expeditious=info")
    }
}

/// Install the global subscriber, writing to stderr. Later calls are no-ops.
pub fn init(quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(quiet));

    let is_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if is_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
