//! Curve25519 key types used by the tunnel device.
//!
//! The UAPI settings channel carries keys as lowercase hex; logs show public
//! keys in base64, matching `wg(8)`.

use crate::error::TunnelError;
use base64::Engine;
use std::fmt;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

fn array_from_slice(bytes: &[u8]) -> Result<[u8; KEY_SIZE], TunnelError> {
    if bytes.len() != KEY_SIZE {
        return Err(TunnelError::InvalidKeyLength(bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

pub(crate) fn decode_hex_key(s: &str) -> Result<[u8; KEY_SIZE], TunnelError> {
    if s.len() != KEY_SIZE * 2 {
        return Err(TunnelError::InvalidKeyLength(s.len() / 2));
    }
    let bytes = hex::decode(s).map_err(|e| TunnelError::InvalidKey(e.to_string()))?;
    array_from_slice(&bytes)
}

/// A peer or interface public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a public key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TunnelError> {
        array_from_slice(bytes).map(Self)
    }

    /// Encodes the key as lowercase hex (UAPI form).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a key from its UAPI hex form.
    pub fn from_hex(s: &str) -> Result<Self, TunnelError> {
        decode_hex_key(s).map(Self)
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        let short = &b64[..8.min(b64.len())];
        write!(f, "PublicKey({short}...)")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(key: X25519PublicKey) -> Self {
        Self::from_bytes_array(*key.as_bytes())
    }
}

/// An interface private key.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Creates a private key from a 32-byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a private key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TunnelError> {
        array_from_slice(bytes).map(Self)
    }

    /// Derives the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        let public = X25519PublicKey::from(&secret);
        PublicKey::from(public)
    }

    /// Returns true for the all-zero key, which UAPI uses to clear the key.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.ct_eq(&[0u8; KEY_SIZE]).into()
    }

    /// Encodes the key as lowercase hex (UAPI form).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decodes a key from its UAPI hex form.
    pub fn from_hex(s: &str) -> Result<Self, TunnelError> {
        decode_hex_key(s).map(Self)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}
