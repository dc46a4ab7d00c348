//! Tracing subscriber setup for binaries and examples.
//!
//! The filter is read from `TRIBUTARY_LOG`, then `RUST_LOG`, falling back to
//! `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

pub fn filter_from_env() -> EnvFilter {
    let directives = std::env::var("TRIBUTARY_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_owned());

    EnvFilter::try_new(&directives).unwrap_or_else(|_| {
        eprintln!("Warning: invalid log filter '{}', using '{}'", directives, DEFAULT_FILTER);
        EnvFilter::new(DEFAULT_FILTER)
    })
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(filter_from_env())
        .with(fmt::layer().with_target(true))
        .try_init();
}
