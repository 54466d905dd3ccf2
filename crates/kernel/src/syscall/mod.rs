//! Syscall entry points of the resource core.
//!
//! Argument marshalling happens in the trap layer; these take decoded
//! arguments and return the value placed in the user's return register.

use kcore_hal::TaskContext;

use crate::init::KernelCore;
use crate::sync::grouplock::{GroupLockError, LockName, NAME_CAPACITY, Z2, verify_all};

/// Status values returned to user space.
pub mod status {
    use crate::sync::grouplock::GroupLockError;

    pub const OK: i64 = 0;
    pub const INVALID_ID: i64 = GroupLockError::InvalidId.status();
    pub const NOT_FOUND: i64 = GroupLockError::NotFound.status();
    pub const ALREADY_EXISTS: i64 = GroupLockError::AlreadyExists.status();
    pub const NOT_HOLDER: i64 = GroupLockError::NotHolder.status();
    pub const BUSY: i64 = GroupLockError::Busy.status();
    pub const VERIFY_FAILED: i64 = -1;
}

fn to_status(result: Result<(), GroupLockError>) -> i64 {
    match result {
        Ok(()) => status::OK,
        Err(e) => e.status(),
    }
}

/// Create lock `id` named by the first NUL-terminated run of `name`
/// (at most 16 bytes are read, 15 kept).
pub fn sys_grouplock_create(kernel: &KernelCore, id: i64, name: &[u8]) -> i64 {
    let raw = &name[..name.len().min(NAME_CAPACITY)];
    to_status(kernel.locks().create(id, LockName::from_bytes(raw)))
}

pub fn sys_grouplock_acquire(kernel: &KernelCore, ctx: &impl TaskContext, id: i64) -> i64 {
    to_status(kernel.locks().acquire(id, ctx))
}

pub fn sys_grouplock_release(kernel: &KernelCore, ctx: &impl TaskContext, id: i64) -> i64 {
    to_status(kernel.locks().release(id, ctx))
}

pub fn sys_grouplock_destroy(kernel: &KernelCore, id: i64) -> i64 {
    to_status(kernel.locks().destroy(id))
}

/// Log a snapshot of lock `id`.
pub fn sys_grouplock_debug(kernel: &KernelCore, id: i64) -> i64 {
    match kernel.locks().debug_info(id) {
        Ok(info) => {
            log::info!("{info}");
            status::OK
        }
        Err(e) => e.status(),
    }
}

/// Re-run the lock self-checks.
pub fn sys_grouplock_verify() -> i64 {
    match verify_all::<Z2>() {
        Ok(()) => status::OK,
        Err(e) => {
            log::error!("[GROUPLOCK] verification failed: {e}");
            status::VERIFY_FAILED
        }
    }
}

/// Free physical memory in KB.
pub fn sys_freemem(kernel: &KernelCore) -> i64 {
    kernel.frames().free_kb() as i64
}
