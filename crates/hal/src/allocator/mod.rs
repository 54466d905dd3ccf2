// Physical frame allocator.
// Refcounted 4KB frames plus 2MB extents seeded at boot, each size served
// from its own intrusive free list threaded through the free memory itself.

mod frame;
mod freelist;

pub use frame::{FrameFlags, FrameInfo, FrameTable};
pub use freelist::FreeList;

pub const PAGE_SIZE: usize = 4096;
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;
pub const PAGES_PER_HUGE: usize = HUGE_PAGE_SIZE / PAGE_SIZE;

/// Fill byte for a freshly allocated 4KB frame.
pub const ALLOC_POISON: u8 = 0x05;
/// Fill byte for a freshly allocated 2MB extent.
pub const HUGE_ALLOC_POISON: u8 = 0x06;
/// Fill byte for memory going back onto a free list.
pub const FREE_POISON: u8 = 0x01;

#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

#[inline]
pub const fn is_page_aligned(addr: usize) -> bool {
    addr % PAGE_SIZE == 0
}

#[inline]
pub const fn is_huge_aligned(addr: usize) -> bool {
    addr % HUGE_PAGE_SIZE == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(page_round_up(0), 0);
        assert_eq!(page_round_up(1), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round_down(PAGE_SIZE + 17), PAGE_SIZE);
        assert_eq!(PAGES_PER_HUGE, 512);
    }

    #[test]
    fn test_alignment_predicates() {
        assert!(is_page_aligned(0x8000_1000));
        assert!(!is_page_aligned(0x8000_1004));
        assert!(is_huge_aligned(0x8020_0000));
        assert!(!is_huge_aligned(0x8020_1000));
    }
}
