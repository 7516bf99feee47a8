//! Process-wide registry of live tunnels.
//!
//! Handles are allocated from a cursor that only moves forward, so a value
//! released by `remove` is not handed out again until every other value in
//! `0..capacity` has been used. Entries are `Arc`s: `lookup` clones the
//! `Arc` under the read lock and the caller keeps using the instance after
//! the lock is gone, so a concurrent `remove` can never free it underneath.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::handle::TunnelHandle;

/// Default number of handle values (`0..i32::MAX`).
pub const DEFAULT_CAPACITY: usize = i32::MAX as usize;

/// Why an insert was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InsertError {
    /// Every handle value is live.
    #[error("all {capacity} tunnel handles are in use")]
    Full {
        /// Table capacity.
        capacity: usize,
    },
    /// A live entry conflicts with the new instance.
    #[error("conflicts with live {0}")]
    Conflict(TunnelHandle),
}

/// A refused insert; hands the instance back to the caller.
#[derive(Debug)]
pub struct InsertRejected<T> {
    /// The instance that was not stored.
    pub instance: T,
    /// Why it was refused.
    pub reason: InsertError,
}

struct Slots<T> {
    entries: HashMap<TunnelHandle, Arc<T>>,
    cursor: i32,
}

/// Maps [`TunnelHandle`]s to shared instances.
pub struct HandleTable<T> {
    slots: RwLock<Slots<T>>,
    capacity: usize,
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    /// Creates an empty table with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty table handing out at most `capacity` live handles.
    ///
    /// `capacity` is clamped to `1..=DEFAULT_CAPACITY`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Slots { entries: HashMap::new(), cursor: 0 }),
            capacity: capacity.clamp(1, DEFAULT_CAPACITY),
        }
    }

    /// Maximum number of live handles.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    /// True when no handle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of the live handles.
    #[must_use]
    pub fn handles(&self) -> Vec<TunnelHandle> {
        let mut handles: Vec<_> = self.slots.read().entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Installs `instance` under a fresh handle.
    pub fn insert(&self, instance: T) -> Result<TunnelHandle, InsertRejected<T>> {
        self.insert_unless(instance, |_, _| false)
    }

    /// Installs `instance` unless `conflicts(&instance, live)` holds for a
    /// live entry. The check and the insert happen under one write lock.
    pub fn insert_unless<F>(&self, instance: T, conflicts: F) -> Result<TunnelHandle, InsertRejected<T>>
    where
        F: Fn(&T, &T) -> bool,
    {
        let mut slots = self.slots.write();

        if let Some((&handle, _)) = slots.entries.iter().find(|&(_, live)| conflicts(&instance, live)) {
            return Err(InsertRejected { instance, reason: InsertError::Conflict(handle) });
        }
        if slots.entries.len() >= self.capacity {
            return Err(InsertRejected {
                instance,
                reason: InsertError::Full { capacity: self.capacity },
            });
        }

        let mut candidate = slots.cursor;
        while slots.entries.contains_key(&TunnelHandle::new(candidate)) {
            candidate = self.wrap(candidate);
        }
        let handle = TunnelHandle::new(candidate);
        slots.cursor = self.wrap(candidate);
        slots.entries.insert(handle, Arc::new(instance));
        Ok(handle)
    }

    /// Resolves a handle without removing it.
    #[must_use]
    pub fn lookup(&self, handle: TunnelHandle) -> Option<Arc<T>> {
        self.slots.read().entries.get(&handle).cloned()
    }

    /// Detaches a handle. Later lookups of the same handle return `None`.
    pub fn remove(&self, handle: TunnelHandle) -> Option<Arc<T>> {
        self.slots.write().entries.remove(&handle)
    }

    /// First live handle whose instance matches `pred`.
    pub fn find<F>(&self, pred: F) -> Option<TunnelHandle>
    where
        F: Fn(&T) -> bool,
    {
        self.slots.read().entries.iter().find(|&(_, live)| pred(live)).map(|(&h, _)| h)
    }

    fn wrap(&self, value: i32) -> i32 {
        let next = value.saturating_add(1);
        if next as usize >= self.capacity { 0 } else { next }
    }
}
