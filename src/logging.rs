//! Log output for test runs.

use crate::{HarnessError, Result, config::LoggingConfig};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a formatted subscriber for the harness' `tracing` events.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes through
/// the test writer so it is captured per test. Calling this again once a
/// subscriber is installed is a no-op, which lets every test call it.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            HarnessError::Config(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let layer = fmt::layer()
        .with_test_writer()
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // Only fails when another subscriber is already installed.
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
    {
        debug!("Keeping the existing log subscriber: {}", e);
    }

    Ok(())
}
