use core::ptr::{self, null_mut};

/// Granularity of every block and allocation.
pub const BLOCK_ALIGN: usize = 16;

/// Header stored at the beginning of every **free** block.
///
/// ```text
/// +----------------------+-------------------------+
/// | ListNode (header)    |   rest of the block     |
/// +----------------------+-------------------------+
/// ^ block_addr                     block_addr + size ^
/// ```
///
/// - `size` is the size of the whole block, header included.
/// - `next` links to the next free block. Free blocks are kept **sorted by
///   address** to enable coalescing.
///
/// Allocated blocks carry no header; `dealloc` gets the size back from the
/// caller's `Layout`.
#[repr(C, align(16))]
struct ListNode {
    size: usize,
    next: *mut ListNode,
}

const _: () = assert!(size_of::<ListNode>() == BLOCK_ALIGN);

/// Align `addr` upwards to `align` (must be a power of two).
#[inline]
const fn align_up(addr: usize, align: usize) -> usize {
    (addr + (align - 1)) & !(align - 1)
}

/// Size actually reserved for a request of `size` bytes.
#[inline]
const fn block_size(size: usize) -> usize {
    if size == 0 {
        BLOCK_ALIGN
    } else {
        align_up(size, BLOCK_ALIGN)
    }
}

/// A first-fit, split-and-coalesce free-list allocator.
///
/// # Invariants
/// - All free blocks are non-overlapping and lie within the heap range.
/// - Every block start and size is a multiple of [`BLOCK_ALIGN`].
/// - `head` is a sentinel; the first real block is at `head.next`.
pub struct FreeListAllocator {
    head: ListNode,
    initialized: bool,
}

// SAFETY: The allocator is always used under SpinLock; raw pointers are only accessed while locked.
unsafe impl Send for FreeListAllocator {}

impl FreeListAllocator {
    /// Construct an empty allocator (heap not yet initialized).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: ListNode {
                size: 0,
                next: null_mut(),
            },
            initialized: false,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Manage the region `[heap_start, heap_start + heap_size)`.
    ///
    /// The start is rounded up and the end down to [`BLOCK_ALIGN`].
    ///
    /// # Safety
    /// - The memory range must be **valid**, **writable**, and **exclusive** to the allocator.
    /// - Must be called **at most once** before any allocations on this instance.
    pub unsafe fn init(&mut self, heap_start: usize, heap_size: usize) {
        let start = align_up(heap_start, BLOCK_ALIGN);
        let end = (heap_start + heap_size) & !(BLOCK_ALIGN - 1);
        self.initialized = true;
        if end > start {
            // SAFETY: the range is exclusively ours per the contract.
            unsafe { self.add_free_region(start, end - start) };
        }
    }

    /// Sum of all free block sizes.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        let mut total = 0;
        let mut current = self.head.next;
        while !current.is_null() {
            // SAFETY: list nodes are valid while the invariants hold.
            unsafe {
                total += (*current).size;
                current = (*current).next;
            }
        }
        total
    }

    /// Insert the free region `[addr, addr + size)` in address order and
    /// coalesce it with its neighbours.
    ///
    /// # Safety
    /// - The range must be valid, unused memory inside the heap.
    /// - `addr` and `size` must be multiples of [`BLOCK_ALIGN`], `size > 0`.
    unsafe fn add_free_region(&mut self, addr: usize, size: usize) {
        debug_assert!(addr.is_multiple_of(BLOCK_ALIGN) && size.is_multiple_of(BLOCK_ALIGN));
        let mut prev = &raw mut self.head;
        let mut current = unsafe { (*prev).next };
        while !current.is_null() && (current as usize) < addr {
            prev = current;
            current = unsafe { (*current).next };
        }
        let new = addr as *mut ListNode;
        unsafe {
            ptr::write(new, ListNode { size, next: current });
            (*prev).next = new;
            self.coalesce(prev);
        }
    }

    /// Merge the block after `prev_ptr` with its successor, then `prev_ptr`
    /// with that block, where they touch.
    ///
    /// # Safety
    /// - The list invariants must hold (sorted, non-overlapping).
    unsafe fn coalesce(&mut self, prev_ptr: *mut ListNode) {
        let curr = unsafe { (*prev_ptr).next };
        if curr.is_null() {
            return;
        }
        let next = unsafe { (*curr).next };
        if !next.is_null() && curr as usize + unsafe { (*curr).size } == next as usize {
            unsafe {
                (*curr).size += (*next).size;
                (*curr).next = (*next).next;
            }
        }
        // The sentinel head does not represent memory.
        if !ptr::eq(prev_ptr, &raw const self.head)
            && prev_ptr as usize + unsafe { (*prev_ptr).size } == curr as usize
        {
            unsafe {
                (*prev_ptr).size += (*curr).size;
                (*prev_ptr).next = (*curr).next;
            }
        }
    }

    /// Find and remove a free region for `size` bytes with `align` alignment.
    ///
    /// Returns the allocation start or null on failure. The unused head and
    /// tail of the chosen block go back on the free list.
    ///
    /// # Safety
    /// - Must only be called while holding the allocator’s lock.
    /// - The free-list invariants must hold.
    pub unsafe fn find_region(&mut self, size: usize, align: usize) -> *mut u8 {
        let size = block_size(size);
        let align = align.max(BLOCK_ALIGN);
        let mut prev = &raw mut self.head;
        let mut current = unsafe { (*prev).next };
        while !current.is_null() {
            let region_start = current as usize;
            let region_end = region_start + unsafe { (*current).size };
            let alloc_start = align_up(region_start, align);
            let alloc_end = alloc_start.saturating_add(size);
            if alloc_end <= region_end {
                unsafe {
                    (*prev).next = (*current).next;
                    if region_end > alloc_end {
                        self.add_free_region(alloc_end, region_end - alloc_end);
                    }
                    if alloc_start > region_start {
                        self.add_free_region(region_start, alloc_start - region_start);
                    }
                }
                return alloc_start as *mut u8;
            }
            prev = current;
            current = unsafe { (*current).next };
        }
        null_mut()
    }

    /// Return a block obtained from [`find_region`](Self::find_region).
    ///
    /// # Safety
    /// - `ptr` must have been returned by this allocator for a request of `size` bytes.
    /// - Must only be called while holding the allocator’s lock.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        unsafe { self.add_free_region(ptr as usize, block_size(size)) };
    }
}

impl Default for FreeListAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4096))]
    struct Arena([u8; 4096]);

    fn with_heap(f: impl FnOnce(&mut FreeListAllocator, usize)) {
        let mut arena = Box::new(Arena([0; 4096]));
        let start = arena.0.as_mut_ptr() as usize;
        let mut a = FreeListAllocator::new();
        unsafe { a.init(start, 4096) };
        f(&mut a, start);
    }

    #[test]
    fn allocations_do_not_overlap() {
        with_heap(|a, start| unsafe {
            let p = a.find_region(24, 8);
            let q = a.find_region(8, 8);
            assert_eq!(p as usize, start);
            assert_eq!(q as usize, start + 32);
            assert_eq!(a.free_bytes(), 4096 - 48);
        });
    }

    #[test]
    fn freed_blocks_coalesce_back() {
        with_heap(|a, _| unsafe {
            let p = a.find_region(100, 8);
            let q = a.find_region(200, 64);
            let r = a.find_region(1, 1);
            a.deallocate(q, 200);
            a.deallocate(p, 100);
            a.deallocate(r, 1);
            assert_eq!(a.free_bytes(), 4096);
            assert_eq!(a.find_region(4096, 16) as usize % 16, 0);
        });
    }

    #[test]
    fn alignment_is_honoured() {
        with_heap(|a, start| unsafe {
            let _ = a.find_region(16, 16);
            let p = a.find_region(64, 256);
            assert_eq!(p as usize % 256, 0);
            assert_eq!(p as usize, start + 256);
            // The gap before the aligned block is still usable.
            let q = a.find_region(32, 16);
            assert_eq!(q as usize, start + 16);
        });
    }

    #[test]
    fn exhaustion_returns_null() {
        with_heap(|a, _| unsafe {
            assert!(a.find_region(8192, 16).is_null());
        });
    }
}
