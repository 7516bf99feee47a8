//! JNI entry points for the Android `GoBackend` classes.
//!
//! `org.amnezia.awg.GoBackend` declares the `awg*` natives and
//! `org.amnezia.vpn.protocol.wireguard.GoBackend` the same set under `wg*`
//! names. Both drive the process-wide bridge.
//!
//! Java string arguments are copied out for the call and the JVM's buffer
//! is released before returning, on every path. Text going back is built
//! as a new Java string and the Rust buffer is dropped in the same call, so
//! nothing is left for the Java side to free.
#![allow(unsafe_code, non_snake_case)]

use std::ptr;

use awg_tunnel::{InterfaceDescriptor, TunnelEngine};
use jni::objects::{JClass, JString};
use jni::sys::{jint, jstring};
use jni::JNIEnv;
use tracing::{debug, warn};

use crate::control::{StartOutcome, TunnelControl};
use crate::error::{BridgeError, BridgeResult, NOT_FOUND, PANICKED};
use crate::ffi::{self, guard};
use crate::global;
use crate::handle::TunnelHandle;

/// Copies a Java string argument. A null reference is invalid input.
fn read_string(env: &mut JNIEnv<'_>, value: &JString<'_>, what: &str) -> BridgeResult<String> {
    env.get_string(value)
        .map(String::from)
        .map_err(|e| BridgeError::InvalidInput(format!("cannot read {what}: {e}")))
}

/// Moves `text` into a new Java string. `None` becomes null.
fn into_java(env: &JNIEnv<'_>, text: Option<String>) -> jstring {
    let Some(text) = text else {
        return ptr::null_mut();
    };
    match env.new_string(&text) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            warn!(error = %e, "cannot create Java string");
            ptr::null_mut()
        }
    }
}

/// Starts a tunnel from arguments already copied off the Java side.
///
/// Either argument failing to read rejects the request before the engine
/// sees it; `tun_fd` then stays with the caller.
pub fn start_tunnel<E: TunnelEngine>(
    control: &TunnelControl<E>,
    ifname: BridgeResult<String>,
    tun_fd: jint,
    settings: BridgeResult<String>,
) -> jint {
    let request = ifname.and_then(|name| settings.map(|settings| (name, settings)));
    let outcome = match request {
        Ok((name, settings)) => control.start(&InterfaceDescriptor::new(&name, tun_fd, &settings)),
        Err(error) => {
            debug!(fd = tun_fd, error = %error, "malformed start request");
            StartOutcome::Rejected { fd: tun_fd, error }
        }
    };
    outcome.code()
}

/// Snapshot text of `handle`, if it names a running tunnel.
pub fn config_text<E: TunnelEngine>(control: &TunnelControl<E>, handle: jint) -> Option<String> {
    TunnelHandle::from_raw(handle).and_then(|h| control.config(h))
}

/// `int awgTurnOn(String ifName, int tunFd, String settings)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_awg_GoBackend_awgTurnOn(
    mut env: JNIEnv,
    _class: JClass,
    ifname: JString,
    tun_fd: jint,
    settings: JString,
) -> jint {
    guard("awgTurnOn", PANICKED, || {
        let ifname = read_string(&mut env, &ifname, "interface name");
        let settings = read_string(&mut env, &settings, "settings");
        start_tunnel(global::bridge(), ifname, tun_fd, settings)
    })
}

/// `void awgTurnOff(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_awg_GoBackend_awgTurnOff(
    _env: JNIEnv,
    _class: JClass,
    handle: jint,
) {
    guard("awgTurnOff", (), || ffi::turn_off(global::bridge(), handle));
}

/// `int awgGetSocketV4(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_awg_GoBackend_awgGetSocketV4(
    _env: JNIEnv,
    _class: JClass,
    handle: jint,
) -> jint {
    guard("awgGetSocketV4", NOT_FOUND, || ffi::socket_v4(global::bridge(), handle))
}

/// `int awgGetSocketV6(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_awg_GoBackend_awgGetSocketV6(
    _env: JNIEnv,
    _class: JClass,
    handle: jint,
) -> jint {
    guard("awgGetSocketV6", NOT_FOUND, || ffi::socket_v6(global::bridge(), handle))
}

/// `String awgGetConfig(int handle)`, null for an unknown handle.
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_awg_GoBackend_awgGetConfig(
    env: JNIEnv,
    _class: JClass,
    handle: jint,
) -> jstring {
    guard("awgGetConfig", ptr::null_mut(), || {
        into_java(&env, config_text(global::bridge(), handle))
    })
}

/// `String awgVersion()`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_awg_GoBackend_awgVersion(
    env: JNIEnv,
    _class: JClass,
) -> jstring {
    guard("awgVersion", ptr::null_mut(), || {
        into_java(&env, awg_tunnel::version().map(str::to_string))
    })
}

/// `int wgTurnOn(String ifName, int tunFd, String settings)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_vpn_protocol_wireguard_GoBackend_wgTurnOn(
    env: JNIEnv,
    class: JClass,
    ifname: JString,
    tun_fd: jint,
    settings: JString,
) -> jint {
    Java_org_amnezia_awg_GoBackend_awgTurnOn(env, class, ifname, tun_fd, settings)
}

/// `void wgTurnOff(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_vpn_protocol_wireguard_GoBackend_wgTurnOff(
    env: JNIEnv,
    class: JClass,
    handle: jint,
) {
    Java_org_amnezia_awg_GoBackend_awgTurnOff(env, class, handle);
}

/// `int wgGetSocketV4(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_vpn_protocol_wireguard_GoBackend_wgGetSocketV4(
    env: JNIEnv,
    class: JClass,
    handle: jint,
) -> jint {
    Java_org_amnezia_awg_GoBackend_awgGetSocketV4(env, class, handle)
}

/// `int wgGetSocketV6(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_vpn_protocol_wireguard_GoBackend_wgGetSocketV6(
    env: JNIEnv,
    class: JClass,
    handle: jint,
) -> jint {
    Java_org_amnezia_awg_GoBackend_awgGetSocketV6(env, class, handle)
}

/// `String wgGetConfig(int handle)`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_vpn_protocol_wireguard_GoBackend_wgGetConfig(
    env: JNIEnv,
    class: JClass,
    handle: jint,
) -> jstring {
    Java_org_amnezia_awg_GoBackend_awgGetConfig(env, class, handle)
}

/// `String wgVersion()`
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_amnezia_vpn_protocol_wireguard_GoBackend_wgVersion(
    env: JNIEnv,
    class: JClass,
) -> jstring {
    Java_org_amnezia_awg_GoBackend_awgVersion(env, class)
}
