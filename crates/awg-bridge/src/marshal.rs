//! Strings across the boundary.
//!
//! Inbound text is a pointer plus an explicit length, borrowed for one
//! call. Outbound text is a NUL-terminated heap string the caller owns
//! until it hands it back to [`free_c_string`].
#![allow(unsafe_code)]

use std::ffi::{c_char, CString};
use std::marker::PhantomData;
use std::ptr;

use tracing::warn;

use crate::error::{BridgeError, BridgeResult};

/// Borrowed byte string with an explicit length.
///
/// Layout matches `struct { const char *p; long n; }` on LP64 targets.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    ptr: *const c_char,
    len: isize,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> ByteView<'a> {
    /// A view of a Rust string.
    #[must_use]
    pub fn new(s: &'a str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// A view of a byte slice.
    #[must_use]
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self {
            ptr: bytes.as_ptr().cast(),
            len: bytes.len() as isize,
            _borrow: PhantomData,
        }
    }

    /// A view built from raw parts, as received from the caller.
    #[must_use]
    pub const fn from_raw_parts(ptr: *const c_char, len: isize) -> Self {
        Self { ptr, len, _borrow: PhantomData }
    }

    /// The viewed bytes.
    ///
    /// A null pointer with length zero is the empty string.
    ///
    /// # Safety
    ///
    /// If `ptr` is non-null it must point to `len` readable bytes that stay
    /// valid and unmodified for `'a`.
    pub unsafe fn as_bytes(&self) -> BridgeResult<&'a [u8]> {
        let len = usize::try_from(self.len)
            .map_err(|_| BridgeError::InvalidInput(format!("negative length {}", self.len)))?;
        if self.ptr.is_null() {
            return if len == 0 {
                Ok(&[])
            } else {
                Err(BridgeError::InvalidInput(format!("null pointer with length {len}")))
            };
        }
        // SAFETY: non-null, and the caller guarantees `len` readable bytes
        // live for `'a`.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.cast::<u8>(), len) })
    }

    /// The viewed bytes as UTF-8 text.
    ///
    /// # Safety
    ///
    /// Same as [`ByteView::as_bytes`].
    pub unsafe fn as_str(&self) -> BridgeResult<&'a str> {
        // SAFETY: forwarded to the caller.
        let bytes = unsafe { self.as_bytes() }?;
        std::str::from_utf8(bytes)
            .map_err(|e| BridgeError::InvalidInput(format!("text is not valid UTF-8: {e}")))
    }
}

/// Moves engine text into a caller-owned C string.
///
/// `None`, or text with an interior NUL, becomes a null pointer.
#[must_use]
pub fn into_c_string(text: Option<String>) -> *mut c_char {
    let Some(text) = text else {
        return ptr::null_mut();
    };
    match CString::new(text) {
        Ok(c) => c.into_raw(),
        Err(e) => {
            warn!(position = e.nul_position(), "outbound text contains NUL; returning nothing");
            ptr::null_mut()
        }
    }
}

/// Releases a string produced by [`into_c_string`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`into_c_string`] that has
/// not been freed yet.
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: the caller guarantees `ptr` came from `CString::into_raw`
    // and is released exactly once.
    drop(unsafe { CString::from_raw(ptr) });
}
