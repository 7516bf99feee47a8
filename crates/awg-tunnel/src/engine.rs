//! Engine traits and a fake engine for tests.
//!
//! A [`TunnelEngine`] turns an [`InterfaceDescriptor`] into a running
//! [`TunnelInstance`]. Callers that manage many instances (the bridge's
//! handle table) only depend on these traits.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{parse_uapi, DeviceConfig};
use crate::error::{Result, TunnelError};
use crate::tun::validate_interface_name;
use crate::tunnel::{StateCell, TunnelState};

/// Everything needed to bring one interface up.
///
/// Borrowed for the duration of [`TunnelEngine::start`]; the descriptor is
/// only transferred to the instance if `start` succeeds.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceDescriptor<'a> {
    /// Interface name, e.g. `wg0`.
    pub name: &'a str,
    /// Tun descriptor the caller is offering.
    pub tun_fd: RawFd,
    /// UAPI `set` settings text.
    pub settings: &'a str,
}

impl<'a> InterfaceDescriptor<'a> {
    /// Creates a descriptor.
    #[must_use]
    pub const fn new(name: &'a str, tun_fd: RawFd, settings: &'a str) -> Self {
        Self { name, tun_fd, settings }
    }
}

/// Creates tunnel instances.
pub trait TunnelEngine: Send + Sync {
    /// Instance type produced by this engine.
    type Instance: TunnelInstance;

    /// Brings an interface up.
    ///
    /// # Errors
    ///
    /// Any error leaves `descriptor.tun_fd` open and owned by the caller.
    fn start(&self, descriptor: &InterfaceDescriptor<'_>) -> Result<Self::Instance>;
}

/// A running tunnel.
///
/// All methods take `&self`; instances are shared between threads behind an
/// `Arc` and release their OS resources when the last reference drops.
pub trait TunnelInstance: Send + Sync + 'static {
    /// Interface name the instance was started with.
    fn interface_name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> TunnelState;

    /// Tun descriptor owned by this instance.
    fn tun_fd(&self) -> Option<RawFd>;

    /// IPv4 transport socket, if running and bound.
    fn socket_v4(&self) -> Option<RawFd>;

    /// IPv6 transport socket, if running and bound.
    fn socket_v6(&self) -> Option<RawFd>;

    /// True if `fd` is the tun descriptor or a transport socket this
    /// instance will close, whatever its state.
    fn owns_fd(&self, fd: RawFd) -> bool;

    /// Renders live configuration and statistics in UAPI `get` format.
    fn uapi_get(&self) -> Result<String>;

    /// Marks the instance destroyed. Idempotent; returns the previous state.
    fn shut_down(&self) -> TunnelState;

    /// Gives the tun descriptor back unclosed and consumes the instance.
    ///
    /// Used when an instance was built but could not be registered.
    fn relinquish(self) -> Option<RawFd>
    where
        Self: Sized;
}

/// Counters shared between a [`FakeEngine`] and the test that owns it.
#[derive(Debug, Default)]
pub struct FakeEngineStats {
    /// Successful starts.
    pub started: AtomicUsize,
    /// Instances whose descriptor was handed back.
    pub relinquished: AtomicUsize,
    /// Instances dropped while still holding their descriptor.
    pub released: AtomicUsize,
}

/// Engine that parses settings but touches no OS resources.
///
/// Socket "descriptors" are synthetic numbers; the tun descriptor is never
/// closed.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    stats: Arc<FakeEngineStats>,
    failure: Arc<Mutex<Option<String>>>,
}

impl FakeEngine {
    /// Creates a new fake engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<FakeEngineStats> {
        Arc::clone(&self.stats)
    }

    /// Makes every following start fail with an invalid-config error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Clears an injected failure.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }
}

impl TunnelEngine for FakeEngine {
    type Instance = FakeTunnel;

    fn start(&self, descriptor: &InterfaceDescriptor<'_>) -> Result<FakeTunnel> {
        validate_interface_name(descriptor.name)?;
        let config = parse_uapi(descriptor.settings)?;
        if descriptor.tun_fd < 0 {
            return Err(TunnelError::BadDescriptor {
                fd: descriptor.tun_fd,
                reason: "negative descriptor".to_string(),
            });
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(TunnelError::InvalidConfig(message));
        }

        let serial = self.stats.started.fetch_add(1, Ordering::Relaxed);
        let base = 10_000 + (serial as RawFd) * 2;
        Ok(FakeTunnel {
            name: descriptor.name.to_string(),
            tun_fd: Some(descriptor.tun_fd),
            sockets: (base, base + 1),
            config,
            state: StateCell::new(TunnelState::Running),
            stats: Arc::clone(&self.stats),
        })
    }
}

/// Instance produced by [`FakeEngine`].
#[derive(Debug)]
pub struct FakeTunnel {
    name: String,
    tun_fd: Option<RawFd>,
    sockets: (RawFd, RawFd),
    config: DeviceConfig,
    state: StateCell,
    stats: Arc<FakeEngineStats>,
}

impl FakeTunnel {
    /// Parsed configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn running(&self) -> bool {
        self.state.get() == TunnelState::Running
    }
}

impl TunnelInstance for FakeTunnel {
    fn interface_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TunnelState {
        self.state.get()
    }

    fn tun_fd(&self) -> Option<RawFd> {
        self.tun_fd
    }

    fn socket_v4(&self) -> Option<RawFd> {
        self.running().then_some(self.sockets.0)
    }

    fn socket_v6(&self) -> Option<RawFd> {
        self.running().then_some(self.sockets.1)
    }

    fn owns_fd(&self, fd: RawFd) -> bool {
        self.tun_fd == Some(fd) || self.sockets.0 == fd || self.sockets.1 == fd
    }

    fn uapi_get(&self) -> Result<String> {
        if !self.running() {
            return Err(TunnelError::NotRunning(self.name.clone()));
        }
        Ok(self.config.to_uapi())
    }

    fn shut_down(&self) -> TunnelState {
        self.state.advance(TunnelState::Destroyed)
    }

    fn relinquish(mut self) -> Option<RawFd> {
        self.stats.relinquished.fetch_add(1, Ordering::Relaxed);
        self.tun_fd.take()
    }
}

impl Drop for FakeTunnel {
    fn drop(&mut self) {
        if self.tun_fd.is_some() {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
        }
    }
}
