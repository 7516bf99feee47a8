//! Userspace AmneziaWG device.
//!
//! A [`Device`] owns the tun descriptor handed over by the caller and the
//! UDP transport sockets it binds for itself. The IPv4 socket is mandatory;
//! the IPv6 socket is bound on the same port when the host supports it.

use std::fmt::Write as FmtWrite;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};
use std::time::SystemTime;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::config::{parse_uapi, DeviceConfig, PROTOCOL_VERSION};
use crate::engine::{InterfaceDescriptor, TunnelEngine, TunnelInstance};
use crate::error::{Result, TunnelError};
use crate::keys::{PrivateKey, PublicKey};
use crate::tun::{check_descriptor, validate_interface_name, TunFd};
use crate::tunnel::{PeerStats, StateCell, TunnelState};

/// Engine that builds [`Device`]s bound to the wildcard addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserspaceEngine {
    skip_ipv6: bool,
}

impl UserspaceEngine {
    /// Creates an engine that binds both address families.
    #[must_use]
    pub const fn new() -> Self {
        Self { skip_ipv6: false }
    }

    /// Creates an engine that never binds an IPv6 socket.
    #[must_use]
    pub const fn ipv4_only() -> Self {
        Self { skip_ipv6: true }
    }
}

impl TunnelEngine for UserspaceEngine {
    type Instance = Device;

    fn start(&self, descriptor: &InterfaceDescriptor<'_>) -> Result<Device> {
        Device::start(descriptor, !self.skip_ipv6)
    }
}

struct Transport {
    v4: UdpSocket,
    v6: Option<UdpSocket>,
    port: u16,
}

/// A running userspace tunnel device.
pub struct Device {
    name: String,
    tun: Option<TunFd>,
    transport: Transport,
    config: DeviceConfig,
    peers: Mutex<Vec<PeerStats>>,
    state: StateCell,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("tun_fd", &self.tun.as_ref().map(AsRawFd::as_raw_fd))
            .field("listen_port", &self.transport.port)
            .field("peers", &self.config.peers.len())
            .field("state", &self.state.get())
            .finish()
    }
}

impl Device {
    /// Validates the descriptor, binds transport sockets and takes
    /// ownership of the tun descriptor.
    ///
    /// Nothing is taken from the caller unless every step succeeds.
    pub fn start(descriptor: &InterfaceDescriptor<'_>, bind_ipv6: bool) -> Result<Self> {
        validate_interface_name(descriptor.name)?;
        let config = parse_uapi(descriptor.settings)?;
        check_descriptor(descriptor.tun_fd)?;

        let transport = bind_transport(descriptor.name, config.listen_port.unwrap_or(0), bind_ipv6)?;
        let tun = TunFd::adopt(descriptor.tun_fd)?;

        if config.fwmark.is_some() {
            debug!(interface = %descriptor.name, fwmark = ?config.fwmark, "fwmark recorded but not applied");
        }

        let peers = config.peers.iter().map(|p| PeerStats::new(p.public_key)).collect();
        let public_key = config.private_key.as_ref().map(PrivateKey::public_key);
        info!(
            interface = %descriptor.name,
            public_key = %public_key.map(|k| k.to_string()).unwrap_or_default(),
            tun_fd = descriptor.tun_fd,
            listen_port = transport.port,
            ipv6 = transport.v6.is_some(),
            peers = config.peers.len(),
            obfuscated = !config.obfuscation.is_empty(),
            "device up"
        );

        Ok(Self {
            name: descriptor.name.to_string(),
            tun: Some(tun),
            transport,
            config,
            peers: Mutex::new(peers),
            state: StateCell::new(TunnelState::Running),
        })
    }

    /// UDP port both transport sockets are bound to.
    #[must_use]
    pub fn listen_port(&self) -> u16 {
        self.transport.port
    }

    /// Public key derived from the interface private key, if one is set.
    #[must_use]
    pub fn public_key(&self) -> Option<PublicKey> {
        self.config.private_key.as_ref().map(PrivateKey::public_key)
    }

    /// Configuration the device was started with.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Records a completed handshake with `peer`.
    pub fn record_handshake(&self, peer: &PublicKey, at: SystemTime) -> Result<()> {
        self.with_peer(peer, |stats| stats.record_handshake(at))
    }

    /// Adds traffic counters for `peer`.
    pub fn record_traffic(&self, peer: &PublicKey, rx: u64, tx: u64) -> Result<()> {
        self.with_peer(peer, |stats| stats.record_traffic(rx, tx))
    }

    fn with_peer(&self, peer: &PublicKey, f: impl FnOnce(&mut PeerStats)) -> Result<()> {
        let mut peers = self.peers.lock();
        let stats = peers
            .iter_mut()
            .find(|s| &s.public_key == peer)
            .ok_or_else(|| TunnelError::InvalidConfig(format!("unknown peer {peer:?}")))?;
        f(stats);
        Ok(())
    }

    fn running(&self) -> bool {
        self.state.get() == TunnelState::Running
    }
}

impl TunnelInstance for Device {
    fn interface_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TunnelState {
        self.state.get()
    }

    fn tun_fd(&self) -> Option<RawFd> {
        self.tun.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn socket_v4(&self) -> Option<RawFd> {
        self.running().then(|| self.transport.v4.as_raw_fd())
    }

    fn socket_v6(&self) -> Option<RawFd> {
        if !self.running() {
            return None;
        }
        self.transport.v6.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn owns_fd(&self, fd: RawFd) -> bool {
        self.tun_fd() == Some(fd)
            || self.transport.v4.as_raw_fd() == fd
            || self.transport.v6.as_ref().is_some_and(|s| s.as_raw_fd() == fd)
    }

    fn uapi_get(&self) -> Result<String> {
        if !self.running() {
            return Err(TunnelError::NotRunning(self.name.clone()));
        }

        let mut out = String::new();
        self.config.write_interface(&mut out, Some(self.transport.port));

        let stats = self.peers.lock();
        for peer in &self.config.peers {
            let _ = writeln!(out, "public_key={}", peer.public_key.to_hex());
            if let Some(psk) = &peer.preshared_key {
                let _ = writeln!(out, "preshared_key={}", psk.to_hex());
            }
            let _ = writeln!(out, "protocol_version={PROTOCOL_VERSION}");
            if let Some(endpoint) = &peer.endpoint {
                let _ = writeln!(out, "endpoint={endpoint}");
            }

            let counters = stats.iter().find(|s| s.public_key == peer.public_key);
            let (sec, nsec) = counters.map_or((0, 0), PeerStats::last_handshake_since_epoch);
            let _ = writeln!(out, "last_handshake_time_sec={sec}");
            let _ = writeln!(out, "last_handshake_time_nsec={nsec}");
            let _ = writeln!(out, "tx_bytes={}", counters.map_or(0, |s| s.tx_bytes));
            let _ = writeln!(out, "rx_bytes={}", counters.map_or(0, |s| s.rx_bytes));
            let _ = writeln!(
                out,
                "persistent_keepalive_interval={}",
                peer.persistent_keepalive.unwrap_or(0)
            );
            for ip in &peer.allowed_ips {
                let _ = writeln!(out, "allowed_ip={ip}");
            }
        }
        Ok(out)
    }

    fn shut_down(&self) -> TunnelState {
        let prev = self.state.advance(TunnelState::Destroyed);
        if prev == TunnelState::Running {
            info!(interface = %self.name, "device down");
        }
        prev
    }

    fn relinquish(mut self) -> Option<RawFd> {
        self.state.advance(TunnelState::Destroyed);
        let fd = self.tun.take().map(TunFd::relinquish);
        debug!(interface = %self.name, tun_fd = ?fd, "tun descriptor handed back");
        fd
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        debug!(
            interface = %self.name,
            tun_fd = ?self.tun.as_ref().map(AsRawFd::as_raw_fd),
            "releasing device resources"
        );
    }
}

fn bind_transport(interface: &str, port: u16, bind_ipv6: bool) -> Result<Transport> {
    let v4_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let v4 = bind_udp(v4_addr).map_err(|source| TunnelError::Bind { addr: v4_addr, source })?;
    let port = v4.local_addr()?.port();

    let v6 = if bind_ipv6 {
        let v6_addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
        match bind_udp(v6_addr) {
            Ok(socket) => Some(socket),
            Err(e) => {
                warn!(interface = %interface, port, error = %e, "IPv6 transport unavailable");
                None
            }
        }
    } else {
        None
    };

    Ok(Transport { v4, v6, port })
}

fn bind_udp(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}
