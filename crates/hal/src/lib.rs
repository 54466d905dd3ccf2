#![cfg_attr(not(any(test, feature = "std")), no_std)]

// HAL crate: hardware-facing primitives shared by the kernel core.
// Interrupt control, IRQ-safe locking, the console sink and the
// physical frame allocator live here; policy lives in the kernel crate.

pub mod allocator;
pub mod console;
pub mod interrupts;
pub mod memory;
pub mod traits;

pub use memory::{FRAME_ALLOCATOR, FrameAllocator, MemoryLayout};
pub use traits::{PageAllocator, Pid, TaskContext};

use core::mem::ManuallyDrop;
use kcore_utils::{Mutex, MutexGuard};

/// IRQ-safe lock that disables interrupts while held.
pub struct IrqSafeLock<T> {
    inner: Mutex<T>,
}

impl<T> IrqSafeLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    /// Disables interrupts, then acquires the lock.
    pub fn lock(&self) -> IrqSafeLockGuard<'_, T> {
        let state = interrupts::disable();
        let guard = self.inner.lock();
        IrqSafeLockGuard {
            guard: ManuallyDrop::new(guard),
            state,
        }
    }
}

pub struct IrqSafeLockGuard<'a, T> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    state: u64,
}

impl<T> core::ops::Deref for IrqSafeLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> core::ops::DerefMut for IrqSafeLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqSafeLockGuard<'_, T> {
    /// Releases the lock, then restores the saved interrupt state.
    fn drop(&mut self) {
        // SAFETY: guard is only dropped once, here in Drop, before restoring interrupts
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        interrupts::restore(self.state);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irq_safe_lock_behavior() {
        let lock = IrqSafeLock::new(10);

        assert!(interrupts::is_enabled());

        {
            let mut guard = lock.lock();
            assert_eq!(*guard, 10);
            *guard = 20;

            assert!(!interrupts::is_enabled());
        }

        assert!(interrupts::is_enabled());
        assert_eq!(*lock.lock(), 20);
    }

    #[test]
    fn test_irq_safe_lock_nested() {
        let lock1 = IrqSafeLock::new(1);
        let lock2 = IrqSafeLock::new(2);

        assert!(interrupts::is_enabled());
        {
            let _g1 = lock1.lock();
            assert!(!interrupts::is_enabled());
            {
                let _g2 = lock2.lock();
                assert!(!interrupts::is_enabled());
            }
            assert!(!interrupts::is_enabled());
        }
        assert!(interrupts::is_enabled());
    }
}
