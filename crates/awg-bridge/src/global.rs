//! The process-wide bridge.
//!
//! Built on first use from [`BridgeConfig::from_env`] and never torn down;
//! tunnels still registered at process exit are abandoned.

use awg_tunnel::UserspaceEngine;
use once_cell::sync::Lazy;

use crate::config::BridgeConfig;
use crate::control::TunnelControl;
use crate::logging;

static BRIDGE: Lazy<TunnelControl<UserspaceEngine>> = Lazy::new(|| {
    let config = BridgeConfig::from_env();
    logging::init(&config);
    config.warn_ignored();
    tracing::info!(
        version = awg_tunnel::version().unwrap_or("unknown"),
        max_tunnels = config.max_tunnels,
        "tunnel bridge initialized"
    );
    TunnelControl::with_capacity(UserspaceEngine::new(), config.max_tunnels)
});

/// The bridge behind the exported C entry points.
pub fn bridge() -> &'static TunnelControl<UserspaceEngine> {
    &BRIDGE
}
