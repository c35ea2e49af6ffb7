//! Tracing subscriber setup.
//!
//! Output goes to stdout only. The level comes from `RUST_LOG` and falls back
//! to `info`, so `RUST_LOG=deathroll_bot=debug` shows cache and refresh chatter.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter from `RUST_LOG`, or `fallback` when unset or unparsable
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber; call once at startup
pub fn init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(env_filter(DEFAULT_DIRECTIVE))
        .init();
}
