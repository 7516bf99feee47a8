//! AmneziaWG tunnel bridge
//!
//! C ABI for driving userspace tunnels from a managed runtime (the Android
//! VPN service calls it through JNI). Tunnels are named by small integer
//! handles; the instance behind a handle never crosses the boundary.
//!
//! ## Entry points
//!
//! | symbol | returns |
//! |---|---|
//! | `awgTurnOn(name, tun_fd, settings)` | handle (>= 0) or negative code |
//! | `awgTurnOff(handle)` | nothing; unknown handles are ignored |
//! | `awgGetSocketV4(handle)` / `awgGetSocketV6(handle)` | fd or -1, still owned by the tunnel |
//! | `awgGetConfig(handle)` | UAPI text or null, free with `awgFreeString` |
//! | `awgVersion()` | version text or null, free with `awgFreeString` |
//!
//! `wg*` aliases of the same functions are exported for the plain
//! WireGuard backend.
//!
//! Strings are passed in as `{ const char *p; long n; }` views and are only
//! borrowed for the call. The tun descriptor passes to the tunnel only when
//! `awgTurnOn` returns a handle.
//!
//! The Android `GoBackend` classes bind to the JNI exports in [`java`]
//! instead; those take and return Java strings and need no freeing.

pub mod config;
pub mod control;
pub mod error;
pub mod ffi;
pub mod global;
pub mod handle;
pub mod java;
pub mod logging;
pub mod marshal;
pub mod table;

pub use config::{BridgeConfig, IgnoredSetting, LogFormat};
pub use control::{StartOutcome, TunnelControl};
pub use error::{BridgeError, BridgeResult};
pub use global::bridge;
pub use handle::TunnelHandle;
pub use marshal::ByteView;
pub use table::{HandleTable, InsertError, InsertRejected};
