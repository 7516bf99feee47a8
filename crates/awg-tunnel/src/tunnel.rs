//! Tunnel lifecycle state and per-peer runtime statistics.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;

/// Lifecycle state of one tunnel instance.
///
/// Transitions only move forward: `Uninitialized -> Running -> Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    /// Created but not yet brought up.
    #[default]
    Uninitialized,
    /// Bound to its descriptor and sockets.
    Running,
    /// Torn down; terminal.
    Destroyed,
}

impl TunnelState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Running => 1,
            Self::Destroyed => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Running,
            _ => Self::Destroyed,
        }
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Running => write!(f, "running"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Atomic cell holding a [`TunnelState`] that refuses backward moves.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Creates a cell in the given state.
    #[must_use]
    pub const fn new(state: TunnelState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> TunnelState {
        TunnelState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if that is a forward transition. Returns the previous
    /// state whether or not the move happened.
    pub fn advance(&self, next: TunnelState) -> TunnelState {
        let prev = self.0.fetch_max(next.as_u8(), Ordering::AcqRel);
        TunnelState::from_u8(prev)
    }
}

/// Runtime counters for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStats {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Wall-clock time of the last completed handshake.
    pub last_handshake: Option<SystemTime>,
    /// Bytes received from this peer.
    pub rx_bytes: u64,
    /// Bytes transmitted to this peer.
    pub tx_bytes: u64,
}

impl PeerStats {
    /// Creates zeroed statistics for a peer.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key, last_handshake: None, rx_bytes: 0, tx_bytes: 0 }
    }

    /// Records a completed handshake at `at`.
    pub fn record_handshake(&mut self, at: SystemTime) {
        self.last_handshake = Some(at);
    }

    /// Records traffic statistics.
    pub fn record_traffic(&mut self, rx: u64, tx: u64) {
        self.rx_bytes = self.rx_bytes.saturating_add(rx);
        self.tx_bytes = self.tx_bytes.saturating_add(tx);
    }

    /// Last handshake as seconds and nanoseconds since the Unix epoch, zero if none.
    #[must_use]
    pub fn last_handshake_since_epoch(&self) -> (u64, u32) {
        let elapsed = self
            .last_handshake
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or(Duration::ZERO);
        (elapsed.as_secs(), elapsed.subsec_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_SIZE;

    #[test]
    fn state_default_is_uninitialized() {
        assert_eq!(TunnelState::default(), TunnelState::Uninitialized);
        assert_eq!(StateCell::default().get(), TunnelState::Uninitialized);
    }

    #[test]
    fn state_display() {
        assert_eq!(TunnelState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(TunnelState::Running.to_string(), "running");
        assert_eq!(TunnelState::Destroyed.to_string(), "destroyed");
    }

    #[test]
    fn state_cell_moves_forward_only() {
        let cell = StateCell::new(TunnelState::Uninitialized);
        assert_eq!(cell.advance(TunnelState::Running), TunnelState::Uninitialized);
        assert_eq!(cell.advance(TunnelState::Destroyed), TunnelState::Running);
        assert_eq!(cell.advance(TunnelState::Running), TunnelState::Destroyed);
        assert_eq!(cell.get(), TunnelState::Destroyed);
    }

    #[test]
    fn destroy_is_idempotent() {
        let cell = StateCell::new(TunnelState::Running);
        assert_eq!(cell.advance(TunnelState::Destroyed), TunnelState::Running);
        assert_eq!(cell.advance(TunnelState::Destroyed), TunnelState::Destroyed);
    }

    #[test]
    fn peer_stats_accumulate() {
        let mut stats = PeerStats::new(PublicKey::from_bytes_array([3u8; KEY_SIZE]));
        stats.record_traffic(1000, 500);
        stats.record_traffic(u64::MAX, 1);
        assert_eq!(stats.rx_bytes, u64::MAX);
        assert_eq!(stats.tx_bytes, 501);
    }

    #[test]
    fn handshake_time_reported_since_epoch() {
        let mut stats = PeerStats::new(PublicKey::from_bytes_array([3u8; KEY_SIZE]));
        assert_eq!(stats.last_handshake_since_epoch(), (0, 0));

        stats.record_handshake(UNIX_EPOCH + Duration::new(1_700_000_000, 42));
        assert_eq!(stats.last_handshake_since_epoch(), (1_700_000_000, 42));
    }
}
