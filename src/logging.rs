//! Logging configuration using tracing
//!
//! Structured logging to stderr with support for the RUST_LOG environment variable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for a given number of `-v` flags
///
/// 0 keeps the CLI quiet (`warn`), each extra flag lowers the threshold.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Default filter directives for a given number of `-v` flags
///
/// The daemon's heartbeat and lifecycle lines stay visible at the quiet level.
pub fn filter_for_verbosity(verbosity: u8) -> String {
    match verbosity {
        0 => format!("{},tjs::sync::daemon=info", level_for_verbosity(0)),
        n => level_for_verbosity(n).to_string(),
    }
}

/// Initialize the tracing subscriber
///
/// Sets up structured logging with:
/// - Filtering via RUST_LOG when set, otherwise by `verbosity`
/// - Compact formatted output to stderr with targets
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show info and above
/// - `RUST_LOG=tjs=debug` - Debug level for the sync engine only
/// - `RUST_LOG=tjs=trace,reqwest=info` - Different levels per crate
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init(verbosity: u8) -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for_verbosity(verbosity)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(verbosity >= 2)
                .compact(),
        )
        .try_init()
        .map_err(|e| crate::TjsError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(2);
}
