//! AmneziaWG obfuscation parameters.
//!
//! Junk packets (`jc`, `jmin`, `jmax`) are sent ahead of a handshake, the
//! handshake messages are padded (`s1`, `s2`), and the four message type
//! fields are replaced by magic headers (`h1`..`h4`). All parameters are
//! optional; an unset parameter keeps stock WireGuard behaviour.

use std::fmt::Write as FmtWrite;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};

/// Upper bound on junk packets sent before a handshake.
pub const MAX_JUNK_PACKET_COUNT: u16 = 128;

/// Upper bound on a single junk packet size.
pub const MAX_JUNK_PACKET_SIZE: u16 = 1280;

/// Handshake initiation message size without padding.
pub const INIT_MESSAGE_SIZE: u32 = 148;

/// Handshake response message size without padding.
pub const RESPONSE_MESSAGE_SIZE: u32 = 92;

/// Obfuscation knobs carried in the interface section of the settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationParams {
    /// `jc`: number of junk packets.
    pub junk_packet_count: Option<u16>,
    /// `jmin`: minimum junk packet size.
    pub junk_packet_min_size: Option<u16>,
    /// `jmax`: maximum junk packet size.
    pub junk_packet_max_size: Option<u16>,
    /// `s1`: padding prepended to handshake initiations.
    pub init_packet_junk_size: Option<u16>,
    /// `s2`: padding prepended to handshake responses.
    pub response_packet_junk_size: Option<u16>,
    /// `h1`: initiation message type.
    pub init_packet_magic_header: Option<u32>,
    /// `h2`: response message type.
    pub response_packet_magic_header: Option<u32>,
    /// `h3`: cookie reply message type.
    pub underload_packet_magic_header: Option<u32>,
    /// `h4`: transport message type.
    pub transport_packet_magic_header: Option<u32>,
}

impl ObfuscationParams {
    /// Returns true when no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies one `key=value` pair. Returns `Ok(false)` if `key` is not an
    /// obfuscation key.
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> std::result::Result<bool, String> {
        fn small(value: &str) -> std::result::Result<u16, String> {
            value.parse().map_err(|_| format!("expected an integer in 0..=65535, got {value:?}"))
        }
        fn header(value: &str) -> std::result::Result<u32, String> {
            value.parse().map_err(|_| format!("expected a 32-bit header, got {value:?}"))
        }

        match key {
            "jc" => self.junk_packet_count = Some(small(value)?),
            "jmin" => self.junk_packet_min_size = Some(small(value)?),
            "jmax" => self.junk_packet_max_size = Some(small(value)?),
            "s1" => self.init_packet_junk_size = Some(small(value)?),
            "s2" => self.response_packet_junk_size = Some(small(value)?),
            "h1" => self.init_packet_magic_header = Some(header(value)?),
            "h2" => self.response_packet_magic_header = Some(header(value)?),
            "h3" => self.underload_packet_magic_header = Some(header(value)?),
            "h4" => self.transport_packet_magic_header = Some(header(value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Checks the parameters for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if let Some(jc) = self.junk_packet_count {
            if jc > MAX_JUNK_PACKET_COUNT {
                return Err(TunnelError::InvalidConfig(format!(
                    "jc {jc} exceeds {MAX_JUNK_PACKET_COUNT}"
                )));
            }
        }

        if let Some(jmax) = self.junk_packet_max_size {
            if jmax > MAX_JUNK_PACKET_SIZE {
                return Err(TunnelError::InvalidConfig(format!(
                    "jmax {jmax} exceeds {MAX_JUNK_PACKET_SIZE}"
                )));
            }
        }

        let jmin = self.junk_packet_min_size.unwrap_or(0);
        let jmax = self.junk_packet_max_size.unwrap_or(jmin);
        if jmin > jmax {
            return Err(TunnelError::InvalidConfig(format!(
                "jmin {jmin} is larger than jmax {jmax}"
            )));
        }

        let s1 = u32::from(self.init_packet_junk_size.unwrap_or(0));
        let s2 = u32::from(self.response_packet_junk_size.unwrap_or(0));
        if INIT_MESSAGE_SIZE + s1 == RESPONSE_MESSAGE_SIZE + s2 {
            return Err(TunnelError::InvalidConfig(
                "s1 and s2 make initiation and response the same size".to_string(),
            ));
        }

        let headers: Vec<u32> = [
            self.init_packet_magic_header,
            self.response_packet_magic_header,
            self.underload_packet_magic_header,
            self.transport_packet_magic_header,
        ]
        .into_iter()
        .flatten()
        .collect();
        for (i, h) in headers.iter().enumerate() {
            if headers[i + 1..].contains(h) {
                return Err(TunnelError::InvalidConfig(format!(
                    "magic header {h} is used more than once"
                )));
            }
        }

        Ok(())
    }

    /// Appends the set parameters as UAPI lines.
    pub(crate) fn write_uapi(&self, out: &mut String) {
        let small = [
            ("jc", self.junk_packet_count),
            ("jmin", self.junk_packet_min_size),
            ("jmax", self.junk_packet_max_size),
            ("s1", self.init_packet_junk_size),
            ("s2", self.response_packet_junk_size),
        ];
        for (key, value) in small {
            if let Some(v) = value {
                let _ = writeln!(out, "{key}={v}");
            }
        }

        let headers = [
            ("h1", self.init_packet_magic_header),
            ("h2", self.response_packet_magic_header),
            ("h3", self.underload_packet_magic_header),
            ("h4", self.transport_packet_magic_header),
        ];
        for (key, value) in headers {
            if let Some(v) = value {
                let _ = writeln!(out, "{key}={v}");
            }
        }
    }
}
