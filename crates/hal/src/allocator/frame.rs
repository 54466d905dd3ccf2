use bitflags::bitflags;
use core::ptr::NonNull;

use super::freelist::FreeList;
use super::{HUGE_PAGE_SIZE, PAGE_SIZE, PAGES_PER_HUGE, is_huge_aligned, is_page_aligned};
use crate::memory::MemoryLayout;

bitflags! {
    /// Flags for a physical page frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        /// Frame is part of a 2MB extent seeded at boot
        const HUGE      = 1 << 0;
        /// Frame is the first of its 2MB extent
        const HUGE_HEAD = 1 << 1;
    }
}

/// Descriptor for one 4KB physical frame.
///
/// One entry per PFN in a caller-provided array. A zero refcount means the
/// frame is free (or in transit to a free list); anything above that is the
/// number of owners sharing it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameInfo {
    pub refcount: u32,
    pub flags: FrameFlags,
}

impl FrameInfo {
    pub const fn new() -> Self {
        Self {
            refcount: 0,
            flags: FrameFlags::empty(),
        }
    }
}

/// Allocator state guarded by the frame allocator lock.
///
/// Every method here runs with the lock held. Filling memory with poison
/// bytes happens outside, between a `put_*`/`link_*` or after a `take_*`.
pub struct FrameTable {
    layout: MemoryLayout,
    frames: &'static mut [FrameInfo],
    small: FreeList,
    huge: FreeList,
}

#[allow(clippy::panic)]
impl FrameTable {
    /// Build an empty table. No frame is free until it is seeded and released.
    pub fn new(layout: MemoryLayout, frames: &'static mut [FrameInfo]) -> Self {
        layout.validate();
        if frames.len() < layout.frame_count() {
            panic!(
                "frame table: {} descriptors for {} frames",
                frames.len(),
                layout.frame_count()
            );
        }
        frames.fill(FrameInfo::new());
        Self {
            layout,
            frames,
            small: FreeList::new(),
            huge: FreeList::new(),
        }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    fn index(&self, pa: usize) -> usize {
        if pa < self.layout.phys_base || pa >= self.layout.phys_top {
            panic!(
                "frame {:#x} outside [{:#x}, {:#x})",
                pa, self.layout.phys_base, self.layout.phys_top
            );
        }
        (pa - self.layout.phys_base) / PAGE_SIZE
    }

    fn check_small(&self, pa: usize, op: &str) {
        if !is_page_aligned(pa) {
            panic!("{op}: frame {pa:#x} not 4KB aligned");
        }
        if pa < self.layout.reserved_end || pa >= self.layout.phys_top {
            panic!("{op}: frame {pa:#x} outside managed memory");
        }
    }

    fn check_huge(&self, pa: usize, op: &str) {
        if !is_huge_aligned(pa) {
            panic!("{op}: extent {pa:#x} not 2MB aligned");
        }
        if pa < self.layout.reserved_end
            || pa >= self.layout.phys_top
            || self.layout.phys_top - pa < HUGE_PAGE_SIZE
        {
            panic!("{op}: extent {pa:#x} outside managed memory");
        }
    }

    fn block(&self, pa: usize) -> NonNull<u8> {
        let Some(block) = NonNull::new(self.layout.phys_to_virt(pa) as *mut u8) else {
            panic!("frame {pa:#x} maps to a null address");
        };
        block
    }

    /// Refcount of the frame containing `pa`.
    pub fn refcount(&self, pa: usize) -> u32 {
        self.frames[self.index(pa)].refcount
    }

    /// Add an owner to the frame containing `pa`.
    pub fn inc_ref(&mut self, pa: usize) {
        let i = self.index(pa);
        let info = &mut self.frames[i];
        if info.refcount == 0 {
            panic!("inc_ref: frame {pa:#x} is free");
        }
        let Some(count) = info.refcount.checked_add(1) else {
            panic!("inc_ref: refcount overflow on frame {pa:#x}");
        };
        info.refcount = count;
    }

    /// Mark a single frame as owned once, ready to be released onto the small list.
    pub fn seed_small(&mut self, pa: usize) {
        self.check_small(pa, "seed_small");
        let i = self.index(pa);
        self.frames[i] = FrameInfo {
            refcount: 1,
            flags: FrameFlags::empty(),
        };
    }

    /// Mark all frames of a 2MB extent as owned once and tag them as huge.
    pub fn seed_huge(&mut self, pa: usize) {
        self.check_huge(pa, "seed_huge");
        let first = self.index(pa);
        for (k, info) in self.frames[first..first + PAGES_PER_HUGE].iter_mut().enumerate() {
            let mut flags = FrameFlags::HUGE;
            if k == 0 {
                flags |= FrameFlags::HUGE_HEAD;
            }
            *info = FrameInfo { refcount: 1, flags };
        }
    }

    /// Drop one reference to a 4KB frame.
    ///
    /// Returns `true` when the last reference went away and the caller must
    /// poison the frame and hand it to [`Self::link_small`].
    pub fn put_small(&mut self, pa: usize) -> bool {
        self.check_small(pa, "free_small");
        let i = self.index(pa);
        let info = &mut self.frames[i];
        if info.flags.contains(FrameFlags::HUGE) {
            panic!("free_small: frame {pa:#x} belongs to a 2MB extent");
        }
        if info.refcount == 0 {
            panic!("free_small: double free of frame {pa:#x}");
        }
        info.refcount -= 1;
        info.refcount == 0
    }

    /// Drop one reference from every still-referenced frame of a 2MB extent.
    ///
    /// Frames already at zero are skipped, so a shared sub-frame keeps the
    /// extent off the huge list until a later call releases it. Returns
    /// `true` once all 512 counts are zero.
    pub fn put_huge(&mut self, pa: usize) -> bool {
        self.check_huge(pa, "free_huge");
        let first = self.index(pa);
        if !self.frames[first].flags.contains(FrameFlags::HUGE_HEAD) {
            panic!("free_huge: {pa:#x} is not the head of a 2MB extent");
        }

        let mut held = false;
        let mut busy = false;
        for info in &mut self.frames[first..first + PAGES_PER_HUGE] {
            if info.refcount > 0 {
                held = true;
                info.refcount -= 1;
                busy |= info.refcount > 0;
            }
        }
        if !held {
            panic!("free_huge: double free of extent {pa:#x}");
        }
        !busy
    }

    /// Push a fully released frame onto the small list.
    ///
    /// # Safety
    /// `pa` must have just been released by [`Self::put_small`] and must be
    /// writable through the direct map.
    pub unsafe fn link_small(&mut self, pa: usize) {
        let block = self.block(pa);
        // SAFETY: released frame, owned by nobody, mapped writable per caller
        unsafe { self.small.push(block) };
    }

    /// Push a fully released extent onto the huge list.
    ///
    /// # Safety
    /// `pa` must have just been released by [`Self::put_huge`] and must be
    /// writable through the direct map.
    pub unsafe fn link_huge(&mut self, pa: usize) {
        let block = self.block(pa);
        // SAFETY: released extent, owned by nobody, mapped writable per caller
        unsafe { self.huge.push(block) };
    }

    /// Pop a 4KB frame and give it its first owner.
    pub fn take_small(&mut self) -> Option<usize> {
        let block = self.small.pop()?;
        let pa = self.layout.virt_to_phys(block.as_ptr() as usize);
        let i = self.index(pa);
        self.frames[i].refcount = 1;
        Some(pa)
    }

    /// Pop a 2MB extent and give each of its frames its first owner.
    pub fn take_huge(&mut self) -> Option<usize> {
        let block = self.huge.pop()?;
        let pa = self.layout.virt_to_phys(block.as_ptr() as usize);
        let first = self.index(pa);
        for info in &mut self.frames[first..first + PAGES_PER_HUGE] {
            info.refcount = 1;
        }
        Some(pa)
    }

    /// `(small entries, huge entries)` currently on the free lists.
    pub fn counts(&self) -> (usize, usize) {
        (self.small.len(), self.huge.len())
    }

    pub fn free_bytes(&self) -> usize {
        let (small, huge) = self.counts();
        small * PAGE_SIZE + huge * HUGE_PAGE_SIZE
    }

    /// Physical address at the head of the small list.
    pub fn small_head(&self) -> Option<usize> {
        self.small
            .head()
            .map(|b| self.layout.virt_to_phys(b.as_ptr() as usize))
    }

    /// Whether the block for `pa` is linked on either free list.
    pub fn is_listed(&self, pa: usize) -> bool {
        let block = self.block(pa);
        self.small.contains(block) || self.huge.contains(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::{Layout, alloc_zeroed};

    // Two extents worth of 2MB-aligned host memory, identity mapped
    fn table(reserved_pages: usize) -> FrameTable {
        let size = 2 * HUGE_PAGE_SIZE;
        let layout = Layout::from_size_align(size, HUGE_PAGE_SIZE).unwrap();
        let base = unsafe { alloc_zeroed(layout) } as usize;
        assert_ne!(base, 0);
        let mem = MemoryLayout::new(base, base + reserved_pages * PAGE_SIZE, base + size);
        let frames = Box::leak(vec![FrameInfo::new(); mem.frame_count()].into_boxed_slice());
        FrameTable::new(mem, frames)
    }

    #[test]
    fn test_seed_huge_tags_extent() {
        let mut t = table(0);
        let base = t.layout().phys_base;
        t.seed_huge(base);
        assert_eq!(t.frames[t.index(base)].flags, FrameFlags::HUGE | FrameFlags::HUGE_HEAD);
        assert_eq!(t.frames[t.index(base + PAGE_SIZE)].flags, FrameFlags::HUGE);
        assert_eq!(t.refcount(base + 511 * PAGE_SIZE), 1);
        assert_eq!(t.frames[t.index(base + HUGE_PAGE_SIZE)].flags, FrameFlags::empty());
    }

    #[test]
    fn test_put_huge_waits_for_shared_subframe() {
        let mut t = table(0);
        let base = t.layout().phys_base;
        t.seed_huge(base);
        t.inc_ref(base + 7 * PAGE_SIZE);

        assert!(!t.put_huge(base));
        assert_eq!(t.refcount(base), 0);
        assert_eq!(t.refcount(base + 7 * PAGE_SIZE), 1);

        // Second release drops the remaining sharer without underflowing the rest
        assert!(t.put_huge(base));
        assert_eq!(t.refcount(base + 7 * PAGE_SIZE), 0);
    }

    #[test]
    fn test_take_sets_refcounts() {
        let mut t = table(0);
        let base = t.layout().phys_base;
        t.seed_huge(base);
        assert!(t.put_huge(base));
        unsafe { t.link_huge(base) };
        assert_eq!(t.counts(), (0, 1));

        assert_eq!(t.take_huge(), Some(base));
        assert!((0..PAGES_PER_HUGE).all(|k| t.refcount(base + k * PAGE_SIZE) == 1));
        assert_eq!(t.take_huge(), None);
    }

    #[test]
    fn test_counts_and_free_bytes() {
        let mut t = table(0);
        let base = t.layout().phys_base;
        let pa = base + HUGE_PAGE_SIZE;
        t.seed_small(pa);
        assert!(t.put_small(pa));
        unsafe { t.link_small(pa) };

        assert_eq!(t.counts(), (1, 0));
        assert_eq!(t.free_bytes(), PAGE_SIZE);
        assert_eq!(t.small_head(), Some(pa));
        assert!(t.is_listed(pa));
        assert_eq!(t.take_small(), Some(pa));
        assert!(!t.is_listed(pa));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_put_small_twice_panics() {
        let mut t = table(1);
        let pa = t.layout().reserved_end;
        t.seed_small(pa);
        assert!(t.put_small(pa));
        t.put_small(pa);
    }

    #[test]
    #[should_panic(expected = "belongs to a 2MB extent")]
    fn test_put_small_on_huge_subframe_panics() {
        let mut t = table(0);
        let base = t.layout().phys_base;
        t.seed_huge(base);
        t.put_small(base + PAGE_SIZE);
    }

    #[test]
    #[should_panic(expected = "is free")]
    fn test_inc_ref_on_free_frame_panics() {
        let mut t = table(0);
        let base = t.layout().phys_base;
        t.inc_ref(base);
    }

    #[test]
    #[should_panic(expected = "descriptors for")]
    fn test_short_descriptor_array_panics() {
        let mem = MemoryLayout::new(0x8000_0000, 0x8000_0000, 0x8040_0000);
        let frames = Box::leak(vec![FrameInfo::new(); 4].into_boxed_slice());
        let _ = FrameTable::new(mem, frames);
    }
}
