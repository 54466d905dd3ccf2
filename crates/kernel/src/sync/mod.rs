//! Kernel synchronization primitives exposed to user space.

pub mod grouplock;

pub use grouplock::{GroupLockError, GroupLockInfo, GroupLockTable};
