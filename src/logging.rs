//! Structured logging setup.
//!
//! Log lines go to stderr so command output on stdout stays clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// Filtering follows `RUST_LOG` when set; otherwise only warnings from this
/// crate (debug builds: info) and errors from dependencies are shown.
pub fn init() {
    let default_level = if cfg!(debug_assertions) {
        "cmdkit=info,error"
    } else {
        "cmdkit=warn,error"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init();
}

/// Initialize logging for tests; safe to call repeatedly.
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
