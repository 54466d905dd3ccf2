// Global physical frame allocator.
// Wraps the frame table in an IRQ-safe lock and does the poison fills
// outside it, so a long 2MB memset never runs with the lock held.

use crate::IrqSafeLock;
use crate::allocator::{
    ALLOC_POISON, FREE_POISON, FrameInfo, FrameTable, HUGE_ALLOC_POISON, HUGE_PAGE_SIZE,
    PAGE_SIZE, is_huge_aligned, is_page_aligned, page_round_down, page_round_up,
};
use crate::traits::PageAllocator;

/// Physical memory handed to the frame allocator at boot.
///
/// Frames in `[phys_base, reserved_end)` hold the kernel image and boot
/// data and are never managed. Frames are touched through
/// `phys + direct_map_offset` (zero when identity mapped).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryLayout {
    pub phys_base: usize,
    pub reserved_end: usize,
    pub phys_top: usize,
    pub direct_map_offset: usize,
}

impl MemoryLayout {
    /// Identity-mapped layout.
    pub const fn new(phys_base: usize, reserved_end: usize, phys_top: usize) -> Self {
        Self {
            phys_base,
            reserved_end,
            phys_top,
            direct_map_offset: 0,
        }
    }

    #[must_use]
    pub const fn with_direct_map(mut self, offset: usize) -> Self {
        self.direct_map_offset = offset;
        self
    }

    /// Number of descriptors needed to cover `[phys_base, phys_top)`.
    pub const fn frame_count(&self) -> usize {
        (self.phys_top - self.phys_base) / PAGE_SIZE
    }

    /// The same layout with `phys_top` cut back to the last whole frame.
    ///
    /// A trailing partial page is never managed; a reserved region reaching
    /// into it is clamped along with the top.
    #[must_use]
    pub const fn whole_frames(self) -> Self {
        let phys_top = page_round_down(self.phys_top);
        let reserved_end = if self.reserved_end > phys_top {
            phys_top
        } else {
            self.reserved_end
        };
        Self {
            reserved_end,
            phys_top,
            ..self
        }
    }

    #[inline]
    pub const fn phys_to_virt(&self, pa: usize) -> usize {
        pa.wrapping_add(self.direct_map_offset)
    }

    #[inline]
    pub const fn virt_to_phys(&self, va: usize) -> usize {
        va.wrapping_sub(self.direct_map_offset)
    }

    #[allow(clippy::panic)]
    pub(crate) fn validate(&self) {
        if !is_page_aligned(self.phys_base) {
            panic!("memory layout: base {:#x} not page aligned", self.phys_base);
        }
        if self.reserved_end < self.phys_base || self.reserved_end > self.phys_top {
            panic!(
                "memory layout: reserved end {:#x} outside [{:#x}, {:#x})",
                self.reserved_end, self.phys_base, self.phys_top
            );
        }
    }
}

/// Frame allocator behind an IRQ-safe lock.
///
/// Unusable until [`FrameAllocator::init`] has run; every other call before
/// that panics.
pub struct FrameAllocator {
    table: IrqSafeLock<Option<FrameTable>>,
}

/// Global frame allocator instance
pub static FRAME_ALLOCATOR: FrameAllocator = FrameAllocator::new();

unsafe fn poison(va: usize, len: usize, byte: u8) {
    // SAFETY: caller owns [va, va + len) exclusively
    unsafe { core::ptr::write_bytes(va as *mut u8, byte, len) };
}

#[allow(clippy::panic)]
impl FrameAllocator {
    pub const fn new() -> Self {
        Self {
            table: IrqSafeLock::new(None),
        }
    }

    fn with_table<R>(&self, f: impl FnOnce(&mut FrameTable) -> R) -> R {
        let mut guard = self.table.lock();
        let Some(table) = guard.as_mut() else {
            panic!("frame allocator used before init");
        };
        f(table)
    }

    pub fn is_initialized(&self) -> bool {
        self.table.lock().is_some()
    }

    /// Take ownership of `[layout.reserved_end, layout.phys_top)`.
    ///
    /// `phys_top` need not be page aligned; a trailing partial page is
    /// dropped. One pass over the range: every 2MB-aligned position with a whole
    /// extent in front of it seeds a huge page, anything else a 4KB frame.
    ///
    /// # Safety
    /// The managed range must be unused RAM, writable at
    /// `phys + direct_map_offset`, and nothing else may touch it afterwards
    /// except through this allocator.
    pub unsafe fn init(&self, layout: MemoryLayout, frames: &'static mut [FrameInfo]) {
        let layout = layout.whole_frames();
        {
            let mut slot = self.table.lock();
            if slot.is_some() {
                panic!("frame allocator initialized twice");
            }
            *slot = Some(FrameTable::new(layout, frames));
        }

        let end = layout.phys_top;
        let mut pa = page_round_up(layout.reserved_end);
        while pa < end {
            if is_huge_aligned(pa) && end - pa >= HUGE_PAGE_SIZE {
                self.with_table(|t| t.seed_huge(pa));
                self.free_huge(pa);
                pa += HUGE_PAGE_SIZE;
            } else {
                self.with_table(|t| t.seed_small(pa));
                self.free_small(pa);
                pa += PAGE_SIZE;
            }
        }

        let (small, huge) = self.free_counts();
        log::info!(
            "[MEM] {} huge pages available, {} small pages, {} KB free",
            huge,
            small,
            self.free_kb()
        );
    }

    /// Allocate one 4KB frame with a refcount of 1, filled with [`ALLOC_POISON`].
    pub fn allocate_small(&self) -> Option<usize> {
        let (pa, va) = self.with_table(|t| {
            let pa = t.take_small()?;
            Some((pa, t.layout().phys_to_virt(pa)))
        })?;
        // SAFETY: just popped, so this caller is the only owner
        unsafe { poison(va, PAGE_SIZE, ALLOC_POISON) };
        log::trace!("[MEM] alloc 4K {pa:#x}");
        Some(pa)
    }

    /// Allocate one 2MB extent, every frame of it with a refcount of 1.
    pub fn allocate_huge(&self) -> Option<usize> {
        let (pa, va) = self.with_table(|t| {
            let pa = t.take_huge()?;
            Some((pa, t.layout().phys_to_virt(pa)))
        })?;
        // SAFETY: just popped, so this caller is the only owner
        unsafe { poison(va, HUGE_PAGE_SIZE, HUGE_ALLOC_POISON) };
        log::trace!("[MEM] alloc 2M {pa:#x}");
        Some(pa)
    }

    /// Drop one reference to a 4KB frame, reclaiming it when none are left.
    ///
    /// Panics on a misaligned or unmanaged address and on a double free.
    pub fn free_small(&self, pa: usize) {
        let Some(va) = self.with_table(|t| t.put_small(pa).then(|| t.layout().phys_to_virt(pa)))
        else {
            return;
        };
        // SAFETY: refcount reached zero; nobody owns the frame any more
        unsafe { poison(va, PAGE_SIZE, FREE_POISON) };
        // SAFETY: released by put_small above and mapped at va
        self.with_table(|t| unsafe { t.link_small(pa) });
    }

    /// Drop one reference to each frame of a 2MB extent.
    ///
    /// The extent only returns to the huge list once all 512 frames are
    /// unreferenced; it is never split into 4KB frames.
    pub fn free_huge(&self, pa: usize) {
        let Some(va) = self.with_table(|t| t.put_huge(pa).then(|| t.layout().phys_to_virt(pa)))
        else {
            log::trace!("[MEM] 2M {pa:#x} still shared");
            return;
        };
        // SAFETY: every frame of the extent is unreferenced
        unsafe { poison(va, HUGE_PAGE_SIZE, FREE_POISON) };
        // SAFETY: released by put_huge above and mapped at va
        self.with_table(|t| unsafe { t.link_huge(pa) });
    }

    /// Register another owner of the frame containing `pa`.
    pub fn inc_ref(&self, pa: usize) {
        self.with_table(|t| t.inc_ref(pa));
    }

    /// Current owner count of the frame containing `pa`.
    pub fn get_ref(&self, pa: usize) -> u32 {
        self.with_table(|t| t.refcount(pa))
    }

    /// `(small entries, huge entries)` on the free lists.
    pub fn free_counts(&self) -> (usize, usize) {
        self.with_table(|t| t.counts())
    }

    pub fn free_bytes(&self) -> usize {
        self.with_table(|t| t.free_bytes())
    }

    pub fn free_kb(&self) -> usize {
        self.free_bytes() / 1024
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAllocator for FrameAllocator {
    fn alloc_page(&self) -> Option<usize> {
        self.allocate_small()
    }

    fn free_page(&self, pa: usize) {
        self.free_small(pa);
    }

    fn alloc_huge_page(&self) -> Option<usize> {
        self.allocate_huge()
    }

    fn free_huge_page(&self, pa: usize) {
        self.free_huge(pa);
    }

    fn share_page(&self, pa: usize) {
        self.inc_ref(pa);
    }
}
