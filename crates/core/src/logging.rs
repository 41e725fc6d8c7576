//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the configuration provides one.
pub const DEFAULT_LOG_FILTER: &str = "info,framepace=debug,naga=warn";

/// Initialize the logging system with tracing.
///
/// The filter is taken from `RUST_LOG` when set, otherwise from `default_filter`.
/// An unparsable `default_filter` falls back to [`DEFAULT_LOG_FILTER`].
///
/// Returns `false` when a global subscriber was already installed. The
/// first subscriber stays in place and the refusal is logged at debug level.
///
/// # Example
/// ```
/// framepace_core::init_logging(framepace_core::DEFAULT_LOG_FILTER);
/// tracing::info!("Frame pacer starting");
/// ```
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
    {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Logging already initialized: {}", e);
            false
        }
    }
}
