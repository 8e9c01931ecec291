//! Logging setup for applications embedding the crate.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the caller.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "anvil=info";
const VERBOSE_LOG_FILTER: &str = "anvil=debug";

#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub verbose: bool,
    pub ansi: bool,
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.verbose { VERBOSE_LOG_FILTER } else { DEFAULT_LOG_FILTER })
        })
    }
}

/// Install a stderr fmt subscriber filtered by `RUST_LOG` (or the defaults).
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_filter(config.filter()),
        )
        .try_init()
        .context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // the first call may lose to another test installing a subscriber
        let _ = init_logging(LogConfig::default());
        assert!(init_logging(LogConfig { verbose: true, ansi: false }).is_err());
    }
}
