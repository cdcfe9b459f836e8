//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::LoggingConfig;

/// Build the filter for a logging configuration; `RUST_LOG` takes precedence.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level.to_tracing_level()).into())
        .from_env_lossy()
}

/// Install a global `fmt` subscriber
///
/// # Arguments
/// * `config` - Level and timestamp settings
///
/// # Returns
/// * `bool` - false when a global subscriber was already installed
pub fn init(config: &LoggingConfig) -> bool {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(false);

    let installed = if config.timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };
    installed.is_ok()
}
