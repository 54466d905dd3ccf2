//! Boot wiring for the resource core.
//!
//! The arch boot path describes physical memory in a [`BootConfig`] and
//! calls [`boot`] once; afterwards the syscall layer reaches both
//! components through [`kernel_core`].

use log::LevelFilter;

use kcore_hal::allocator::FrameInfo;
use kcore_hal::{FRAME_ALLOCATOR, FrameAllocator, MemoryLayout};
use kcore_utils::Once;

use crate::logger;
use crate::sync::grouplock::GroupLockTable;

/// Everything [`boot`] needs from the platform.
#[derive(Clone, Copy, Debug)]
pub struct BootConfig {
    pub layout: MemoryLayout,
    pub log_level: LevelFilter,
}

impl BootConfig {
    pub const fn new(layout: MemoryLayout) -> Self {
        Self {
            layout,
            log_level: logger::DEFAULT_LEVEL,
        }
    }

    #[must_use]
    pub const fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }
}

/// The frame allocator and the group lock table, bundled for the syscall layer.
pub struct KernelCore {
    frames: &'static FrameAllocator,
    locks: GroupLockTable,
}

impl KernelCore {
    /// Bundle an already initialized frame allocator with a fresh lock
    /// table. Runs the lock self-checks.
    pub fn new(frames: &'static FrameAllocator) -> Self {
        Self {
            frames,
            locks: GroupLockTable::init(),
        }
    }

    pub fn frames(&self) -> &'static FrameAllocator {
        self.frames
    }

    pub fn locks(&self) -> &GroupLockTable {
        &self.locks
    }
}

static CORE: Once<KernelCore> = Once::new();

/// Bring up logging, the global frame allocator and the lock table.
///
/// Only the first call does anything; later calls return the same core.
///
/// # Safety
/// Same contract as [`FrameAllocator::init`]: the managed part of
/// `config.layout` must be unused RAM reachable through its direct map.
pub unsafe fn boot(config: BootConfig, frames: &'static mut [FrameInfo]) -> &'static KernelCore {
    CORE.call_once(|| {
        logger::init(config.log_level);
        log::info!(
            "[BOOT] memory [{:#x}, {:#x}), reserved below {:#x}",
            config.layout.phys_base,
            config.layout.phys_top,
            config.layout.reserved_end
        );
        // SAFETY: forwarded from the caller
        unsafe { FRAME_ALLOCATOR.init(config.layout, frames) };
        let kernel = KernelCore::new(&FRAME_ALLOCATOR);
        log::info!("[BOOT] resource core ready, {} KB free", kernel.frames().free_kb());
        kernel
    })
}

/// The core set up by [`boot`], if it has run.
pub fn kernel_core() -> Option<&'static KernelCore> {
    CORE.get()
}
