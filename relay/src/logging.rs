//! Development-time tracing for `relay`.
//!
//! Diagnostics go to stderr and are filtered by `RUST_LOG`. They are separate
//! from the session event log (`io/event_log`), which is written to the file
//! named by `event_log` in `relay.toml` whatever the filter says.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "warn";

/// Install the global subscriber: compact lines on stderr, filtered by
/// `RUST_LOG` (default `warn`).
///
/// ```bash
/// RUST_LOG=relay=debug relay run --input "draft a plan"
/// ```
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(filter_from(directives.as_deref()))
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Parse `directives`, falling back to `warn` when unset or malformed.
fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}
