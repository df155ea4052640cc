//! Tracing subscriber setup for hosts embedding the engine.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one is left alone.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_FILTER)
}

/// As [`init_tracing`], with a caller-chosen fallback directive.
pub fn init_tracing_with(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
