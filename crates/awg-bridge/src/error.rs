//! Bridge error types

use std::os::raw::c_int;

use awg_tunnel::TunnelError;
use thiserror::Error;

/// `awgTurnOn` code for a malformed interface name or settings text.
pub const INVALID_INPUT: c_int = -1;

/// `awgTurnOn` code when no handle or OS resource is left.
pub const RESOURCE_EXHAUSTED: c_int = -2;

/// `awgTurnOn` code when the engine refused the descriptor or settings.
pub const ENGINE_FAILURE: c_int = -3;

/// `awgTurnOn` code when a panic was caught at the boundary.
pub const PANICKED: c_int = -4;

/// Sentinel returned by queries on an unknown handle.
pub const NOT_FOUND: c_int = -1;

/// Bridge error type
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed input from the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Handle space or OS resources exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The tunnel engine rejected the request
    #[error("Engine failure: {0}")]
    Engine(TunnelError),
}

impl BridgeError {
    /// Get the ABI code for this error
    pub fn code(&self) -> c_int {
        match self {
            Self::InvalidInput(_) => INVALID_INPUT,
            Self::ResourceExhausted(_) => RESOURCE_EXHAUSTED,
            Self::Engine(_) => ENGINE_FAILURE,
        }
    }
}

impl From<TunnelError> for BridgeError {
    fn from(err: TunnelError) -> Self {
        if err.is_invalid_input() {
            Self::InvalidInput(err.to_string())
        } else if err.is_resource_exhaustion() {
            Self::ResourceExhausted(err.to_string())
        } else {
            Self::Engine(err)
        }
    }
}

/// Bridge result type
pub type BridgeResult<T> = Result<T, BridgeError>;
