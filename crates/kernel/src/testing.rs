// Host stand-ins for the scheduler and physical memory, shared by unit tests.

use std::alloc::{Layout, alloc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use kcore_hal::allocator::{FrameInfo, HUGE_PAGE_SIZE, PAGE_SIZE};
use kcore_hal::{FrameAllocator, MemoryLayout, Pid, TaskContext};

static NEXT_PID: AtomicUsize = AtomicUsize::new(1);

std::thread_local! {
    static PID: Pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
}

/// Every OS thread is a task with its own pid; ticks are milliseconds.
pub struct HostTasks {
    epoch: Instant,
}

impl HostTasks {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl TaskContext for HostTasks {
    fn current_pid(&self) -> Pid {
        PID.with(|pid| *pid)
    }

    fn ticks(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// 2MB-aligned heap memory used as identity-mapped RAM.
///
/// Never freed: allocators built over it are `'static`.
pub struct Arena {
    pub layout: MemoryLayout,
}

impl Arena {
    /// One reserved page, one huge extent, then `tail_pages` small frames.
    pub fn new(tail_pages: usize) -> Self {
        let size = 2 * HUGE_PAGE_SIZE + tail_pages * PAGE_SIZE;
        let layout = Layout::from_size_align(size, HUGE_PAGE_SIZE).unwrap();
        let base = unsafe { alloc(layout) } as usize;
        assert_ne!(base, 0);
        Self {
            layout: MemoryLayout::new(base, base + PAGE_SIZE, base + size),
        }
    }

    pub fn descriptors(&self) -> &'static mut [FrameInfo] {
        Box::leak(vec![FrameInfo::new(); self.layout.frame_count()].into_boxed_slice())
    }

    pub fn frames(&self) -> &'static FrameAllocator {
        let frames: &'static FrameAllocator = Box::leak(Box::new(FrameAllocator::new()));
        unsafe { frames.init(self.layout, self.descriptors()) };
        frames
    }
}
