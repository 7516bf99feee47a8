//! Tunnel control operations over a handle table.

use std::os::fd::RawFd;
use std::os::raw::c_int;

use awg_tunnel::{InterfaceDescriptor, TunnelEngine, TunnelError, TunnelInstance, TunnelState};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::handle::TunnelHandle;
use crate::table::{HandleTable, InsertError, InsertRejected};

/// Result of [`TunnelControl::start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The tunnel is running and owns the descriptor.
    Started(TunnelHandle),
    /// Nothing was created; `fd` is untouched and still the caller's.
    Rejected {
        /// The descriptor the caller offered.
        fd: RawFd,
        /// Why the start failed.
        error: BridgeError,
    },
}

impl StartOutcome {
    /// The handle, or the negative error code.
    #[must_use]
    pub fn code(&self) -> c_int {
        match self {
            Self::Started(handle) => handle.get(),
            Self::Rejected { error, .. } => error.code(),
        }
    }

    /// The handle if the tunnel started.
    #[must_use]
    pub fn handle(&self) -> Option<TunnelHandle> {
        match self {
            Self::Started(handle) => Some(*handle),
            Self::Rejected { .. } => None,
        }
    }
}

/// Starts, stops and queries tunnels produced by an engine.
///
/// Every method may be called from any thread.
#[derive(Debug)]
pub struct TunnelControl<E: TunnelEngine> {
    engine: E,
    table: HandleTable<E::Instance>,
}

impl<E: TunnelEngine> TunnelControl<E> {
    /// Creates a control with the default handle capacity.
    pub fn new(engine: E) -> Self {
        Self { engine, table: HandleTable::new() }
    }

    /// Creates a control allowing at most `max_tunnels` live tunnels.
    pub fn with_capacity(engine: E, max_tunnels: usize) -> Self {
        Self { engine, table: HandleTable::with_capacity(max_tunnels) }
    }

    /// The underlying handle table.
    pub fn table(&self) -> &HandleTable<E::Instance> {
        &self.table
    }

    /// The engine tunnels are started with.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Brings a tunnel up and registers it under a new handle.
    pub fn start(&self, descriptor: &InterfaceDescriptor<'_>) -> StartOutcome {
        let fd = descriptor.tun_fd;
        let reject = |error: BridgeError| {
            warn!(interface = %descriptor.name, fd, code = error.code(), error = %error, "tunnel start rejected");
            StartOutcome::Rejected { fd, error }
        };

        if let Some(owner) = self.table.find(|live| live.owns_fd(fd)) {
            debug!(interface = %descriptor.name, fd, owner = owner.get(), "descriptor already bound");
            return reject(BridgeError::Engine(TunnelError::DescriptorInUse(fd)));
        }

        let instance = match self.engine.start(descriptor) {
            Ok(instance) => instance,
            Err(e) => return reject(e.into()),
        };

        let inserted = self
            .table
            .insert_unless(instance, |new, live| new.tun_fd().is_some_and(|fd| live.owns_fd(fd)));
        match inserted {
            Ok(handle) => {
                info!(interface = %descriptor.name, fd, handle = handle.get(), "tunnel started");
                StartOutcome::Started(handle)
            }
            Err(InsertRejected { instance, reason }) => {
                let returned = instance.relinquish();
                debug!(interface = %descriptor.name, fd, returned = ?returned, "descriptor handed back");
                let error = match reason {
                    InsertError::Full { .. } => BridgeError::ResourceExhausted(reason.to_string()),
                    InsertError::Conflict(_) => BridgeError::Engine(TunnelError::DescriptorInUse(fd)),
                };
                reject(error)
            }
        }
    }

    /// Tears a tunnel down. Unknown or already stopped handles are ignored.
    pub fn stop(&self, handle: TunnelHandle) {
        let Some(instance) = self.table.remove(handle) else {
            debug!(handle = handle.get(), "stop on unknown handle");
            return;
        };
        let prev = instance.shut_down();
        info!(
            interface = %instance.interface_name(),
            handle = handle.get(),
            was = %prev,
            "tunnel stopped"
        );
    }

    /// IPv4 transport socket of a running tunnel. Not transferred.
    pub fn socket_v4(&self, handle: TunnelHandle) -> Option<RawFd> {
        self.running(handle)?.socket_v4()
    }

    /// IPv6 transport socket of a running tunnel. Not transferred.
    pub fn socket_v6(&self, handle: TunnelHandle) -> Option<RawFd> {
        self.running(handle)?.socket_v6()
    }

    /// Fresh snapshot of a running tunnel's configuration and state.
    pub fn config(&self, handle: TunnelHandle) -> Option<String> {
        let instance = self.running(handle)?;
        match instance.uapi_get() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(interface = %instance.interface_name(), handle = handle.get(), error = %e, "no snapshot");
                None
            }
        }
    }

    /// Build version of the tunnel engine.
    pub fn version(&self) -> Option<&'static str> {
        awg_tunnel::version()
    }

    fn running(&self, handle: TunnelHandle) -> Option<std::sync::Arc<E::Instance>> {
        self.table.lookup(handle).filter(|i| i.state() == TunnelState::Running)
    }
}
