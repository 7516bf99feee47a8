//! Tun descriptor handling.
//!
//! The caller hands over a raw descriptor. It is only inspected (never
//! modified or closed) until the device is fully built; [`TunFd::adopt`]
//! then takes ownership, and [`TunFd::relinquish`] can give it back
//! unclosed if a later step fails.

use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};

use crate::error::{Result, TunnelError};

/// Maximum interface name length in bytes (`IFNAMSIZ - 1`).
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Checks that an interface name can be handed to the OS.
pub fn validate_interface_name(name: &str) -> Result<()> {
    let reject = |reason| {
        Err(TunnelError::InvalidInterfaceName { name: name.to_string(), reason })
    };
    if name.is_empty() {
        return reject("name is empty");
    }
    if name.len() > MAX_INTERFACE_NAME_LEN {
        return reject("name is longer than 15 bytes");
    }
    if name.bytes().any(|b| b == 0 || b == b'/' || b.is_ascii_whitespace()) {
        return reject("name contains NUL, '/' or whitespace");
    }
    Ok(())
}

/// Checks that `fd` refers to an open descriptor without taking ownership.
pub fn check_descriptor(fd: RawFd) -> Result<()> {
    if fd < 0 {
        return Err(TunnelError::BadDescriptor { fd, reason: "negative descriptor".to_string() });
    }
    match fcntl(fd, FcntlArg::F_GETFD) {
        Ok(_) => Ok(()),
        Err(Errno::EBADF) => Err(TunnelError::BadDescriptor {
            fd,
            reason: "descriptor is not open".to_string(),
        }),
        Err(e) => Err(TunnelError::BadDescriptor { fd, reason: e.desc().to_string() }),
    }
}

/// A tun descriptor owned by a running device.
#[derive(Debug)]
pub struct TunFd(OwnedFd);

impl TunFd {
    /// Takes ownership of `fd` after checking it is open.
    ///
    /// On error the descriptor is untouched and still belongs to the caller.
    pub fn adopt(fd: RawFd) -> Result<Self> {
        check_descriptor(fd)?;
        // SAFETY: the descriptor is open (checked above) and the caller
        // transfers it to us; nothing else in this process closes it from
        // here on.
        #[allow(unsafe_code)]
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self(owned))
    }

    /// Gives the descriptor back without closing it.
    #[must_use]
    pub fn relinquish(self) -> RawFd {
        self.0.into_raw_fd()
    }
}

impl AsRawFd for TunFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
