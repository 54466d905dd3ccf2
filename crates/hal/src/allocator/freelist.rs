use core::marker::PhantomData;
use core::ptr::NonNull;

/// Link word stored in the first bytes of every free block.
#[repr(C)]
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// Intrusive LIFO list of free memory blocks.
///
/// The list owns no storage of its own: each block on it holds the pointer
/// to the next one. Blocks are handed in and out as virtual addresses.
pub struct FreeList {
    head: Option<NonNull<FreeNode>>,
}

// SAFETY: FreeList is only reached through the allocator lock
unsafe impl Send for FreeList {}

impl FreeList {
    pub const fn new() -> Self {
        Self { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Link `block` in as the new head.
    ///
    /// # Safety
    /// `block` must be writable for at least one pointer, pointer-aligned,
    /// exclusively owned by the caller and not already on any list. The
    /// list keeps using that memory until the block is popped again.
    pub unsafe fn push(&mut self, block: NonNull<u8>) {
        let node = block.cast::<FreeNode>();
        // SAFETY: caller guarantees the block is writable and unaliased
        unsafe { node.as_ptr().write(FreeNode { next: self.head }) };
        self.head = Some(node);
    }

    /// Unlink and return the head block.
    pub fn pop(&mut self) -> Option<NonNull<u8>> {
        let node = self.head?;
        // SAFETY: every node on the list was initialized by push
        self.head = unsafe { node.as_ref().next };
        Some(node.cast())
    }

    pub fn head(&self) -> Option<NonNull<u8>> {
        self.head.map(NonNull::cast)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            cursor: self.head,
            _list: PhantomData,
        }
    }

    /// Number of blocks on the list. Walks the whole chain.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn contains(&self, block: NonNull<u8>) -> bool {
        self.iter().any(|b| b == block)
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a> {
    cursor: Option<NonNull<FreeNode>>,
    _list: PhantomData<&'a FreeList>,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        // SAFETY: the borrowed list cannot change while the iterator lives
        self.cursor = unsafe { node.as_ref().next };
        Some(node.cast())
    }
}
