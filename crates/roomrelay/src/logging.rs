//! `tracing` subscriber setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// The filter comes from `cli` when given, then `RUST_LOG`, then
/// `fallback` (the config file's `log_level`). Calling it twice is a no-op.
pub fn init(cli: Option<&str>, fallback: &str) {
    let filter = match cli {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
