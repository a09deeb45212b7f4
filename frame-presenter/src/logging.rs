//! Logging setup for binaries and tests built on this crate.
//!
//! The library itself only emits `tracing` events. Applications call
//! [`init_logging`] once at startup to route those events to `stderr`.

use crate::config::LoggingConfig;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `fmt` subscriber writing to `stderr`.
///
/// `RUST_LOG` wins over the configured filter; an unparsable configured filter
/// falls back to `info`. Calling this more than once is harmless, later calls
/// leave the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

/// Test-only variant that captures output through the libtest writer.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new("frame_presenter=trace"))
        .with_test_writer()
        .try_init();
}
