//! Error types for tunnel device operations.

use std::net::SocketAddr;
use std::os::fd::RawFd;

use nix::errno::Errno;
use thiserror::Error;

/// Errors that can occur while configuring or running a tunnel device.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid CIDR notation.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Invalid endpoint address.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Interface name rejected.
    #[error("invalid interface name {name:?}: {reason}")]
    InvalidInterfaceName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Settings line could not be parsed.
    #[error("settings line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// Settings parsed but are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tun descriptor is not usable.
    #[error("bad tun descriptor {fd}: {reason}")]
    BadDescriptor {
        /// The descriptor as passed by the caller.
        fd: RawFd,
        /// Why it was rejected.
        reason: String,
    },

    /// The tun descriptor already backs a running tunnel.
    #[error("tun descriptor {0} is already bound to a running tunnel")]
    DescriptorInUse(RawFd),

    /// A transport socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The device has been shut down.
    #[error("device {0} is not running")]
    NotRunning(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// True when the OS ran out of descriptors, buffers or ports.
    #[must_use]
    pub fn is_resource_exhaustion(&self) -> bool {
        let source = match self {
            Self::Bind { source, .. } | Self::Io(source) => source,
            _ => return false,
        };
        source.raw_os_error().is_some_and(|code| {
            matches!(
                Errno::from_raw(code),
                Errno::EMFILE | Errno::ENFILE | Errno::ENOBUFS | Errno::ENOMEM
            )
        })
    }

    /// True for errors caused by the caller's name or settings text.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInterfaceName { .. } | Self::Parse { .. })
    }
}

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;
