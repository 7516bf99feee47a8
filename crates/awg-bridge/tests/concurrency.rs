//! Concurrent use of the bridge.
//!
//! - N concurrent starts yield N distinct handles and a consistent table
//! - stop racing with queries never yields stale data
//! - concurrent starts past the tunnel limit hand descriptors back
#![allow(unsafe_code)]

use std::collections::HashSet;
use std::ffi::CStr;
use std::fs::File;
use std::os::fd::{IntoRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;

use awg_bridge::error::{NOT_FOUND, RESOURCE_EXHAUSTED};
use awg_bridge::ffi::{self, awgFreeString, awgGetConfig, awgGetSocketV4, awgTurnOff, awgTurnOn};
use awg_bridge::{ByteView, StartOutcome, TunnelControl, TunnelHandle};
use awg_tunnel::{check_descriptor, FakeEngine, InterfaceDescriptor, UserspaceEngine};

const THREADS: usize = 16;

fn dev_null() -> RawFd {
    File::open("/dev/null").expect("open /dev/null").into_raw_fd()
}

// ============================================================================
// Concurrent starts
// ============================================================================

#[test]
fn test_concurrent_starts_yield_distinct_handles() {
    let control = TunnelControl::new(UserspaceEngine::ipv4_only());
    let barrier = Barrier::new(THREADS);

    let handles: Vec<TunnelHandle> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|i| {
                let control = &control;
                let barrier = &barrier;
                s.spawn(move || {
                    let name = format!("wg{i}");
                    let fd = dev_null();
                    barrier.wait();
                    control
                        .start(&InterfaceDescriptor::new(&name, fd, "listen_port=0\n"))
                        .handle()
                        .expect("tunnel started")
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().expect("worker")).collect()
    });

    let distinct: HashSet<_> = handles.iter().copied().collect();
    assert_eq!(distinct.len(), THREADS);

    let mut expected = handles.clone();
    expected.sort_unstable();
    assert_eq!(control.table().handles(), expected);
    for h in &handles {
        assert!(control.socket_v4(*h).is_some());
    }

    thread::scope(|s| {
        for h in &handles {
            let control = &control;
            s.spawn(move || control.stop(*h));
        }
    });
    assert!(control.table().is_empty());
}

#[test]
fn test_concurrent_starts_through_c_entry_points() {
    let barrier = Barrier::new(THREADS);

    let handles: Vec<i32> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|i| {
                let barrier = &barrier;
                s.spawn(move || {
                    let name = format!("awg{i}");
                    let fd = dev_null();
                    barrier.wait();
                    unsafe { awgTurnOn(ByteView::new(&name), fd, ByteView::new("")) }
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().expect("worker")).collect()
    });

    assert!(handles.iter().all(|h| *h >= 0));
    let distinct: HashSet<_> = handles.iter().copied().collect();
    assert_eq!(distinct.len(), THREADS);

    let sockets: HashSet<_> = handles.iter().map(|h| awgGetSocketV4(*h)).collect();
    assert_eq!(sockets.len(), THREADS);

    for h in handles {
        awgTurnOff(h);
        assert_eq!(awgGetSocketV4(h), NOT_FOUND);
    }
}

#[test]
fn test_concurrent_starts_past_limit_keep_descriptors() {
    let limit = 4;
    let control = TunnelControl::with_capacity(FakeEngine::new(), limit);
    let stats = control.engine().stats();
    let barrier = Barrier::new(THREADS);

    let outcomes: Vec<StartOutcome> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|i| {
                let control = &control;
                let barrier = &barrier;
                s.spawn(move || {
                    let name = format!("wg{i}");
                    barrier.wait();
                    control.start(&InterfaceDescriptor::new(&name, 100 + i as RawFd, ""))
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().expect("worker")).collect()
    });

    let started = outcomes.iter().filter(|o| o.handle().is_some()).count();
    assert_eq!(started, limit);
    assert_eq!(control.table().len(), limit);
    for outcome in &outcomes {
        if let StartOutcome::Rejected { .. } = outcome {
            assert_eq!(outcome.code(), RESOURCE_EXHAUSTED);
        }
    }
    assert_eq!(stats.relinquished.load(Ordering::Relaxed), THREADS - limit);
}

// ============================================================================
// Stop racing with queries
// ============================================================================

#[test]
fn test_stop_races_with_config_and_socket_queries() {
    let h = unsafe { awgTurnOn(ByteView::new("race0"), dev_null(), ByteView::new("")) };
    assert!(h >= 0);
    let stopped = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            let stopped = &stopped;
            s.spawn(move || {
                loop {
                    let was_stopped = stopped.load(Ordering::Acquire);
                    let ptr = awgGetConfig(h);
                    if ptr.is_null() {
                        assert_eq!(awgGetSocketV4(h), NOT_FOUND);
                        break;
                    }
                    assert!(!was_stopped, "snapshot returned after stop completed");
                    let text = unsafe { CStr::from_ptr(ptr) }.to_str().expect("utf-8");
                    assert!(text.contains("listen_port="));
                    unsafe { awgFreeString(ptr) };
                }
            });
        }

        s.spawn(|| {
            thread::yield_now();
            awgTurnOff(h);
            stopped.store(true, Ordering::Release);
            awgTurnOff(h);
        });
    });

    assert!(awgGetConfig(h).is_null());
}

#[test]
fn test_held_instance_survives_concurrent_stop() {
    let control = TunnelControl::new(UserspaceEngine::ipv4_only());
    let fd = dev_null();
    let h = control
        .start(&InterfaceDescriptor::new("wg0", fd, ""))
        .handle()
        .expect("tunnel started");

    let held = control.table().lookup(h).expect("live");
    control.stop(h);

    assert!(control.socket_v4(h).is_none());
    assert!(check_descriptor(fd).is_ok(), "descriptor stays open while referenced");
    drop(held);
}

#[test]
fn test_ffi_helpers_against_injected_control() {
    let control = TunnelControl::new(FakeEngine::new());
    let h = unsafe { ffi::turn_on(&control, ByteView::new("wg0"), 3, ByteView::new("")) };
    assert!(h >= 0);
    assert!(ffi::socket_v4(&control, h) >= 0);
    ffi::turn_off(&control, h);
    assert_eq!(ffi::socket_v4(&control, h), NOT_FOUND);
}
