//! Opaque tunnel handles.

use std::fmt;
use std::os::raw::c_int;

use serde::{Deserialize, Serialize};

/// Small non-negative integer naming one live tunnel.
///
/// Handles cross the boundary as plain `int`s; the instance address never
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelHandle(i32);

impl TunnelHandle {
    /// Wraps a handle value. Only the handle table mints handles that
    /// resolve to anything.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Interprets a value received from the caller; negative values are
    /// never handles.
    #[must_use]
    pub const fn from_raw(value: c_int) -> Option<Self> {
        if value < 0 { None } else { Some(Self(value)) }
    }

    /// The value handed to the caller.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {}", self.0)
    }
}
