//! Architecture-independent traits at the seams between the core and its
//! collaborators (page-table code above, scheduler beside).

/// Process identifier as handed out by the scheduler.
pub type Pid = usize;

/// Trait for physical page allocation, used by MMU code for page tables and
/// by the fault path for copy-on-write sharing.
pub trait PageAllocator: Send + Sync {
    /// Allocate a 4KB physical page.
    fn alloc_page(&self) -> Option<usize>;
    /// Drop one reference to a 4KB physical page.
    fn free_page(&self, pa: usize);
    /// Allocate a 2MB-aligned 2MB physical page.
    fn alloc_huge_page(&self) -> Option<usize>;
    /// Drop one reference to each 4KB page of a 2MB physical page.
    fn free_huge_page(&self, pa: usize);
    /// Register an additional sharer of the page containing `pa`.
    fn share_page(&self, pa: usize);
}

/// What the core needs to know about the execution context calling into it.
///
/// Implemented by the scheduler on hardware and by a thread-backed context
/// in host tests.
pub trait TaskContext: Sync {
    /// Identity of the calling task.
    fn current_pid(&self) -> Pid;

    /// Monotonic tick counter.
    fn ticks(&self) -> u64;

    /// Give up the processor so other runnable work can proceed.
    fn yield_now(&self);
}
