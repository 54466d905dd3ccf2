//! Kernel resource core.
//!
//! - `sync::grouplock` - Z/2Z group locks and their self-checks
//! - `init` - boot wiring and the [`KernelCore`] handle
//! - `syscall` - status-returning entry points for the trap layer
//! - `logger` - `log` backend on the HAL console
//!
//! Physical frame allocation lives in `kcore_hal`; this crate only hands it
//! its memory layout at boot.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod init;
pub mod logger;
pub mod sync;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use init::{BootConfig, KernelCore, boot, kernel_core};
