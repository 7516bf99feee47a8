//! AmneziaWG userspace tunnel device.
//!
//! This crate turns an interface name, a tun descriptor and UAPI `set`
//! settings into a running device that owns its transport sockets:
//!
//! - [`parse_uapi`] reads settings, including the AmneziaWG obfuscation
//!   keys (`jc`, `jmin`, `jmax`, `s1`, `s2`, `h1`..`h4`)
//! - [`UserspaceEngine`] binds the IPv4 socket (and IPv6 when available)
//!   and adopts the tun descriptor
//! - [`TunnelInstance::uapi_get`] renders the live configuration
//!
//! The [`TunnelEngine`] and [`TunnelInstance`] traits are what callers
//! managing many tunnels program against; [`FakeEngine`] stands in for the
//! real device in tests.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
mod keys;
pub mod obfuscation;
pub mod tun;
pub mod tunnel;
mod types;

pub use config::{parse_uapi, DeviceConfig, PeerConfig, PROTOCOL_VERSION};
pub use device::{Device, UserspaceEngine};
pub use engine::{
    FakeEngine, FakeEngineStats, FakeTunnel, InterfaceDescriptor, TunnelEngine, TunnelInstance,
};
pub use error::{Result, TunnelError};
pub use keys::{PrivateKey, PublicKey, KEY_SIZE};
pub use obfuscation::ObfuscationParams;
pub use tun::{check_descriptor, validate_interface_name, TunFd, MAX_INTERFACE_NAME_LEN};
pub use tunnel::{PeerStats, StateCell, TunnelState};
pub use types::{AllowedIp, Endpoint, PresharedKey};

/// Version of the tunnel implementation, as reported by `awgVersion`.
#[must_use]
pub fn version() -> Option<&'static str> {
    option_env!("CARGO_PKG_VERSION").filter(|v| !v.is_empty())
}
