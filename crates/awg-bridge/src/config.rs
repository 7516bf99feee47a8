//! Bridge configuration.
//!
//! The bridge is loaded into a host process and has no config file; the
//! few knobs it has are read from the environment once, when the
//! process-wide bridge is first used.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::table::DEFAULT_CAPACITY;

/// Maximum number of live tunnels.
pub const ENV_MAX_TUNNELS: &str = "AWG_BRIDGE_MAX_TUNNELS";

/// `tracing` filter directives.
pub const ENV_LOG: &str = "AWG_LOG";

/// Fallback filter directives.
pub const ENV_RUST_LOG: &str = "RUST_LOG";

/// `text` or `json`.
pub const ENV_LOG_FORMAT: &str = "AWG_LOG_FORMAT";

/// Filter used when neither `AWG_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "awg_bridge=info,awg_tunnel=info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// An environment value that was rejected while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredSetting {
    /// Variable name.
    pub variable: &'static str,
    /// The rejected value.
    pub value: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Configuration for the process-wide bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Maximum number of live tunnels.
    pub max_tunnels: usize,
    /// `tracing` filter directives.
    pub log_filter: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Values read from the environment but not applied. Loading happens
    /// before logging is set up, so these are reported by
    /// [`BridgeConfig::warn_ignored`] afterwards.
    #[serde(skip)]
    pub ignored: Vec<IgnoredSetting>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_tunnels: DEFAULT_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::Text,
            ignored: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Sets the tunnel limit.
    #[must_use]
    pub fn with_max_tunnels(mut self, max_tunnels: usize) -> Self {
        self.max_tunnels = max_tunnels;
        self
    }

    /// Sets the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Sets the log format.
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Reads overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`. Invalid values are recorded in
    /// `ignored` and the default is kept.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_TUNNELS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if (1..=DEFAULT_CAPACITY).contains(&n) => config.max_tunnels = n,
                _ => config.ignored.push(IgnoredSetting {
                    variable: ENV_MAX_TUNNELS,
                    value: raw,
                    reason: "not a tunnel count between 1 and 2147483647",
                }),
            }
        }

        if let Some(filter) = lookup(ENV_LOG).or_else(|| lookup(ENV_RUST_LOG)) {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            match LogFormat::parse(&raw) {
                Some(format) => config.log_format = format,
                None => config.ignored.push(IgnoredSetting {
                    variable: ENV_LOG_FORMAT,
                    value: raw,
                    reason: "expected text or json",
                }),
            }
        }

        config
    }

    /// Logs every value in `ignored`.
    pub fn warn_ignored(&self) {
        for setting in &self.ignored {
            warn!(
                variable = setting.variable,
                value = %setting.value,
                reason = setting.reason,
                "ignoring invalid environment setting"
            );
        }
    }
}
