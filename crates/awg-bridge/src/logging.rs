//! Log subscriber setup.

use std::io;

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{BridgeConfig, LogFormat, DEFAULT_LOG_FILTER};

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Installs a stderr subscriber for the bridge, once per process.
///
/// Returns false if the host already installed a global subscriber; the
/// bridge then logs through that one.
pub fn init(config: &BridgeConfig) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_new(&config.log_filter)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let installed = match config.log_format {
            LogFormat::Text => tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr).with_ansi(false))
                .with(filter)
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(io::stderr))
                .with(filter)
                .try_init(),
        }
        .is_ok();

        if installed {
            tracing::debug!(filter = %config.log_filter, format = ?config.log_format, "bridge logging initialized");
        }
        installed
    })
}
