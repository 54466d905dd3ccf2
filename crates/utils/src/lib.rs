#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::fmt;

// Re-export spin crate types as our lock API
pub use spin::Once;
pub use spin::{Mutex, MutexGuard};

/// Bounded, NUL-free name buffer.
///
/// Holds at most `N - 1` bytes so the stored form always fits a C-style
/// `char[N]` with its terminator. Longer input is truncated, never rejected.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedName<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FixedName<N> {
    /// Maximum number of bytes kept.
    pub const CAPACITY: usize = N - 1;

    /// Empty name.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
        }
    }

    /// Copy `name`, truncating on a character boundary.
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(Self::CAPACITY);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self::from_bytes(&name.as_bytes()[..end])
    }

    /// Copy raw bytes up to the first NUL or `CAPACITY`, whichever comes first.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut out = Self::empty();
        for &b in raw.iter().take(Self::CAPACITY) {
            if b == 0 {
                break;
            }
            out.bytes[out.len] = b;
            out.len += 1;
        }
        out
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Longest valid UTF-8 prefix of the stored bytes.
    pub fn as_str(&self) -> &str {
        let raw = self.as_bytes();
        match core::str::from_utf8(raw) {
            Ok(s) => s,
            // valid_up_to() marks a boundary that always decodes
            Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for FixedName<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> From<&str> for FixedName<N> {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl<const N: usize> From<&[u8]> for FixedName<N> {
    fn from(raw: &[u8]) -> Self {
        Self::from_bytes(raw)
    }
}

impl<const N: usize> fmt::Debug for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> fmt::Display for FixedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
