//! C entry points.
//!
//! Each exported function marshals its arguments, delegates to the
//! process-wide [`TunnelControl`] and maps the result to an `int`, a
//! pointer or nothing. Panics are caught here and become the failure
//! sentinel.
//!
//! Strings returned by `awgGetConfig` and `awgVersion` belong to the
//! caller and must be released with `awgFreeString`, never with libc
//! `free`. JVM callers use the exports in [`crate::java`].
#![allow(unsafe_code, non_snake_case)]

use std::any::Any;
use std::ffi::c_char;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};

use awg_tunnel::{InterfaceDescriptor, TunnelEngine};
use tracing::error;

use crate::control::{StartOutcome, TunnelControl};
use crate::error::{BridgeError, BridgeResult, NOT_FOUND, PANICKED};
use crate::global;
use crate::handle::TunnelHandle;
use crate::marshal::{free_c_string, into_c_string, ByteView};

/// Runs `f`, turning a panic into `fallback`.
pub fn guard<T>(entry: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            error!(entry, panic = %panic_message(payload.as_ref()), "panic caught at C boundary");
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Marshals a start request and runs it against `control`.
///
/// # Safety
///
/// `ifname` and `settings` must satisfy [`ByteView::as_bytes`].
pub unsafe fn turn_on<E: TunnelEngine>(
    control: &TunnelControl<E>,
    ifname: ByteView<'_>,
    tun_fd: c_int,
    settings: ByteView<'_>,
) -> c_int {
    // SAFETY: forwarded to the caller.
    let outcome = match unsafe { read_request(ifname, settings) } {
        Ok((name, settings)) => control.start(&InterfaceDescriptor::new(name, tun_fd, settings)),
        Err(error) => StartOutcome::Rejected { fd: tun_fd, error },
    };
    if let StartOutcome::Rejected { fd, error: BridgeError::InvalidInput(reason) } = &outcome {
        tracing::debug!(fd, reason = %reason, "malformed start request");
    }
    outcome.code()
}

unsafe fn read_request<'a>(ifname: ByteView<'a>, settings: ByteView<'a>) -> BridgeResult<(&'a str, &'a str)> {
    // SAFETY: forwarded to the caller.
    let name = unsafe { ifname.as_str() }?;
    // SAFETY: as above.
    let settings = unsafe { settings.as_str() }?;
    Ok((name, settings))
}

/// Stops `handle` on `control`; negative and unknown handles are ignored.
pub fn turn_off<E: TunnelEngine>(control: &TunnelControl<E>, handle: c_int) {
    if let Some(handle) = TunnelHandle::from_raw(handle) {
        control.stop(handle);
    }
}

/// IPv4 socket of `handle`, or -1.
pub fn socket_v4<E: TunnelEngine>(control: &TunnelControl<E>, handle: c_int) -> c_int {
    TunnelHandle::from_raw(handle)
        .and_then(|h| control.socket_v4(h))
        .unwrap_or(NOT_FOUND)
}

/// IPv6 socket of `handle`, or -1.
pub fn socket_v6<E: TunnelEngine>(control: &TunnelControl<E>, handle: c_int) -> c_int {
    TunnelHandle::from_raw(handle)
        .and_then(|h| control.socket_v6(h))
        .unwrap_or(NOT_FOUND)
}

/// Caller-owned snapshot of `handle`, or null.
pub fn config<E: TunnelEngine>(control: &TunnelControl<E>, handle: c_int) -> *mut c_char {
    into_c_string(TunnelHandle::from_raw(handle).and_then(|h| control.config(h)))
}

/// Caller-owned version string, or null.
pub fn version() -> *mut c_char {
    into_c_string(awg_tunnel::version().map(str::to_string))
}

/// Starts a tunnel on `tun_fd`. Returns a handle (>= 0) or a negative code.
///
/// The descriptor belongs to the tunnel only if a handle is returned.
///
/// # Safety
///
/// `ifname` and `settings` must point to `len` readable bytes (or be null
/// with length 0) for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awgTurnOn(ifname: ByteView<'_>, tun_fd: c_int, settings: ByteView<'_>) -> c_int {
    // SAFETY: forwarded to the caller.
    guard("awgTurnOn", PANICKED, || unsafe { turn_on(global::bridge(), ifname, tun_fd, settings) })
}

/// Stops a tunnel. Unknown handles are ignored.
#[unsafe(no_mangle)]
pub extern "C" fn awgTurnOff(handle: c_int) {
    guard("awgTurnOff", (), || turn_off(global::bridge(), handle));
}

/// IPv4 transport socket of a running tunnel, or -1. Do not close it.
#[unsafe(no_mangle)]
pub extern "C" fn awgGetSocketV4(handle: c_int) -> c_int {
    guard("awgGetSocketV4", NOT_FOUND, || socket_v4(global::bridge(), handle))
}

/// IPv6 transport socket of a running tunnel, or -1. Do not close it.
#[unsafe(no_mangle)]
pub extern "C" fn awgGetSocketV6(handle: c_int) -> c_int {
    guard("awgGetSocketV6", NOT_FOUND, || socket_v6(global::bridge(), handle))
}

/// UAPI snapshot of a running tunnel, or null. Free with `awgFreeString`.
#[unsafe(no_mangle)]
pub extern "C" fn awgGetConfig(handle: c_int) -> *mut c_char {
    guard("awgGetConfig", std::ptr::null_mut(), || config(global::bridge(), handle))
}

/// Engine version, or null. Free with `awgFreeString`.
#[unsafe(no_mangle)]
pub extern "C" fn awgVersion() -> *mut c_char {
    guard("awgVersion", std::ptr::null_mut(), version)
}

/// Releases a string returned by this library. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a string from `awgGetConfig`/`awgVersion` that
/// has not been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awgFreeString(ptr: *mut c_char) {
    // SAFETY: forwarded to the caller.
    guard("awgFreeString", (), || unsafe { free_c_string(ptr) });
}

/// Alias of [`awgTurnOn`].
///
/// # Safety
///
/// Same as [`awgTurnOn`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wgTurnOn(ifname: ByteView<'_>, tun_fd: c_int, settings: ByteView<'_>) -> c_int {
    // SAFETY: forwarded to the caller.
    unsafe { awgTurnOn(ifname, tun_fd, settings) }
}

/// Alias of [`awgTurnOff`].
#[unsafe(no_mangle)]
pub extern "C" fn wgTurnOff(handle: c_int) {
    awgTurnOff(handle);
}

/// Alias of [`awgGetSocketV4`].
#[unsafe(no_mangle)]
pub extern "C" fn wgGetSocketV4(handle: c_int) -> c_int {
    awgGetSocketV4(handle)
}

/// Alias of [`awgGetSocketV6`].
#[unsafe(no_mangle)]
pub extern "C" fn wgGetSocketV6(handle: c_int) -> c_int {
    awgGetSocketV6(handle)
}

/// Alias of [`awgGetConfig`].
#[unsafe(no_mangle)]
pub extern "C" fn wgGetConfig(handle: c_int) -> *mut c_char {
    awgGetConfig(handle)
}

/// Alias of [`awgVersion`].
#[unsafe(no_mangle)]
pub extern "C" fn wgVersion() -> *mut c_char {
    awgVersion()
}
