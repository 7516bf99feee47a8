//! Tunnel lifecycle through the exported C entry points.
//!
//! These tests drive the process-wide bridge with the real userspace
//! engine:
//! - start binds transport sockets and returns a handle
//! - stop is idempotent and hides everything behind the handle
//! - failed starts leave the tun descriptor with the caller
//! - returned strings are independent and freed exactly once
#![allow(unsafe_code)]

use std::ffi::{c_char, CStr};
use std::fs::File;
use std::os::fd::{IntoRawFd, RawFd};

use awg_bridge::error::{ENGINE_FAILURE, INVALID_INPUT, NOT_FOUND};
use awg_bridge::ffi::{
    awgFreeString, awgGetConfig, awgGetSocketV4, awgGetSocketV6, awgTurnOff, awgTurnOn,
    awgVersion, wgGetSocketV4, wgTurnOff, wgTurnOn, wgVersion,
};
use awg_bridge::{bridge, ByteView};
use awg_tunnel::{check_descriptor, PrivateKey, PublicKey, KEY_SIZE};

fn dev_null() -> RawFd {
    File::open("/dev/null").expect("open /dev/null").into_raw_fd()
}

fn turn_on(name: &str, fd: RawFd, settings: &str) -> i32 {
    unsafe { awgTurnOn(ByteView::new(name), fd, ByteView::new(settings)) }
}

fn read_and_free(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_str().expect("utf-8").to_string();
    unsafe { awgFreeString(ptr) };
    Some(text)
}

// ============================================================================
// Start / stop scenario
// ============================================================================

#[test]
fn test_start_query_stop() {
    let h = turn_on("wg0", dev_null(), "listen_port=0\n");
    assert!(h >= 0, "start failed with {h}");

    let v4 = awgGetSocketV4(h);
    assert!(v4 >= 0);
    assert!(check_descriptor(v4).is_ok());

    awgTurnOff(h);
    assert_eq!(awgGetSocketV4(h), NOT_FOUND);
    assert_eq!(awgGetSocketV6(h), NOT_FOUND);
    assert!(awgGetConfig(h).is_null());
}

#[test]
fn test_ipv6_socket_is_distinct_when_present() {
    let h = turn_on("wg1", dev_null(), "");
    assert!(h >= 0);

    let v4 = awgGetSocketV4(h);
    let v6 = awgGetSocketV6(h);
    if v6 != NOT_FOUND {
        assert_ne!(v4, v6);
        assert!(check_descriptor(v6).is_ok());
    }

    awgTurnOff(h);
}

#[test]
fn test_stop_is_idempotent_and_ignores_unknown_handles() {
    let h = turn_on("wg2", dev_null(), "");
    assert!(h >= 0);

    awgTurnOff(h);
    awgTurnOff(h);
    awgTurnOff(-1);
    awgTurnOff(i32::MAX);

    assert!(bridge().table().lookup(awg_bridge::TunnelHandle::new(h)).is_none());
}

#[test]
fn test_handles_not_reused_right_after_stop() {
    let first = turn_on("wg3", dev_null(), "");
    assert!(first >= 0);
    awgTurnOff(first);

    let second = turn_on("wg3", dev_null(), "");
    assert!(second >= 0);
    assert_ne!(first, second);
    assert_eq!(awgGetSocketV4(first), NOT_FOUND);

    awgTurnOff(second);
}

// ============================================================================
// Failed starts leave the descriptor with the caller
// ============================================================================

#[test]
fn test_empty_name_rejected_and_fd_still_owned() {
    let fd = dev_null();
    assert!(turn_on("", fd, "") < 0);
    nix::unistd::close(fd).expect("caller closes its own descriptor");
}

#[test]
fn test_malformed_settings_rejected() {
    let fd = dev_null();
    assert_eq!(turn_on("wg4", fd, "listen_port=port\n"), INVALID_INPUT);
    assert_eq!(turn_on("wg4", fd, "jmin=90\njmax=10\n"), ENGINE_FAILURE);
    nix::unistd::close(fd).expect("caller closes its own descriptor");
}

#[test]
fn test_unopened_descriptor_rejected() {
    assert_eq!(turn_on("wg5", RawFd::MAX, ""), ENGINE_FAILURE);
    assert_eq!(turn_on("wg5", -1, ""), ENGINE_FAILURE);
}

#[test]
fn test_descriptor_bound_twice_rejected() {
    let fd = dev_null();
    let h = turn_on("wg6", fd, "");
    assert!(h >= 0);

    assert_eq!(turn_on("wg7", fd, ""), ENGINE_FAILURE);
    assert!(check_descriptor(fd).is_ok(), "running tunnel keeps its descriptor");
    assert!(awgGetSocketV4(h) >= 0);

    awgTurnOff(h);
}

#[test]
fn test_bridge_owned_socket_rejected_as_tun() {
    let h = turn_on("wg12", dev_null(), "");
    assert!(h >= 0);
    let v4 = awgGetSocketV4(h);
    assert!(v4 >= 0);

    assert_eq!(turn_on("wg13", v4, ""), ENGINE_FAILURE);
    let v6 = awgGetSocketV6(h);
    if v6 != NOT_FOUND {
        assert_eq!(turn_on("wg13", v6, ""), ENGINE_FAILURE);
    }

    assert_eq!(awgGetSocketV4(h), v4);
    assert!(check_descriptor(v4).is_ok(), "socket still owned by its tunnel");
    awgTurnOff(h);
}

#[test]
fn test_port_conflict_rejected() {
    let h = turn_on("wg8", dev_null(), "");
    assert!(h >= 0);
    let config = read_and_free(awgGetConfig(h)).expect("running");
    let port_line = config
        .lines()
        .find(|l| l.starts_with("listen_port="))
        .expect("snapshot reports the port");

    let fd = dev_null();
    assert_eq!(turn_on("wg9", fd, &format!("{port_line}\n")), ENGINE_FAILURE);
    nix::unistd::close(fd).expect("caller closes its own descriptor");

    awgTurnOff(h);
}

// ============================================================================
// Config snapshots
// ============================================================================

#[test]
fn test_config_reports_settings() {
    let private = PrivateKey::from_bytes(&[5u8; KEY_SIZE]).expect("valid key");
    let peer = PublicKey::from_bytes(&[9u8; KEY_SIZE]).expect("valid key");
    let settings = format!(
        "private_key={}\nlisten_port=0\njc=4\njmin=40\njmax=70\ns1=10\ns2=20\nh1=101\nh2=102\nh3=103\nh4=104\n\
         replace_peers=true\npublic_key={}\nendpoint=203.0.113.7:51820\n\
         persistent_keepalive_interval=25\nreplace_allowed_ips=true\nallowed_ip=0.0.0.0/0\n",
        private.to_hex(),
        peer.to_hex()
    );
    let h = turn_on("awg0", dev_null(), &settings);
    assert!(h >= 0);

    let config = read_and_free(awgGetConfig(h)).expect("running");
    assert!(config.contains(&format!("private_key={}\n", private.to_hex())));
    assert!(config.contains("jc=4\n"));
    assert!(config.contains("h4=104\n"));
    assert!(config.contains(&format!("public_key={}\n", peer.to_hex())));
    assert!(config.contains("endpoint=203.0.113.7:51820\n"));
    assert!(config.contains("persistent_keepalive_interval=25\n"));
    assert!(config.ends_with("allowed_ip=0.0.0.0/0\n"));
    assert!(!config.contains("listen_port=0\n"));

    awgTurnOff(h);
}

#[test]
fn test_config_buffers_are_independent() {
    let h = turn_on("wg10", dev_null(), "");
    assert!(h >= 0);

    let first = awgGetConfig(h);
    let second = awgGetConfig(h);
    assert!(!first.is_null());
    assert_ne!(first, second);

    let first = read_and_free(first).expect("snapshot");
    let second = read_and_free(second).expect("snapshot");
    assert_eq!(first, second);

    awgTurnOff(h);
}

#[test]
fn test_free_null_is_ignored() {
    unsafe { awgFreeString(std::ptr::null_mut()) };
}

// ============================================================================
// Version and aliases
// ============================================================================

#[test]
fn test_version_stable_and_non_empty() {
    let a = read_and_free(awgVersion()).expect("version");
    let b = read_and_free(awgVersion()).expect("version");
    assert!(!a.is_empty());
    assert_eq!(a, b);
    assert_eq!(read_and_free(wgVersion()), Some(a));
}

#[test]
fn test_wg_aliases_share_the_table() {
    let h = unsafe { wgTurnOn(ByteView::new("wg11"), dev_null(), ByteView::new("")) };
    assert!(h >= 0);
    assert_eq!(wgGetSocketV4(h), awgGetSocketV4(h));

    wgTurnOff(h);
    assert_eq!(awgGetSocketV4(h), NOT_FOUND);
}
