//! Core value types for tunnel configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use ipnet::IpNet;
use subtle::ConstantTimeEq;

use crate::error::{Result, TunnelError};
use crate::keys::{decode_hex_key, KEY_SIZE};

/// A peer preshared key (optional, 32 bytes).
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    /// Encodes the key as lowercase hex (UAPI form).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a preshared key from its UAPI hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_hex_key(s).map(Self)
    }

    /// Returns true for the all-zero key, which UAPI uses to mean "no key".
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.ct_eq(&[0u8; KEY_SIZE]).into()
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}

/// An allowed IP address or network in CIDR notation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AllowedIp {
    network: IpNet,
}

impl AllowedIp {
    /// Creates an allowed IP from CIDR notation.
    pub fn from_cidr(s: &str) -> Result<Self> {
        let network = s
            .parse::<IpNet>()
            .map_err(|e| TunnelError::InvalidCidr(format!("{s}: {e}")))?;
        Ok(Self { network })
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

/// A peer endpoint (`ip:port`, IPv6 in brackets).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: SocketAddr,
}

impl FromStr for Endpoint {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self> {
        let address = s
            .parse::<SocketAddr>()
            .map_err(|e| TunnelError::InvalidEndpoint(format!("{s}: {e}")))?;
        Ok(Self { address })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
