//! # Static Kernel Heap
//!
//! A [`GlobalAlloc`] over a statically reserved region in `.bss`, backed by a
//! [`FreeListAllocator`] under a [`SpinLock`].
//!
//! Task stacks, inboxes, file-descriptor tables and the app-load cache all
//! live here. Allocation masks interrupts for the duration of the list walk,
//! so the heap may also be used from interrupt handlers.
//!
//! The kernel binary installs it with:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: kernel_alloc::KernelHeap = kernel_alloc::KernelHeap;
//! ```

use crate::free_list::FreeListAllocator;
use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_sync::SpinLock;

/// Total size of the statically reserved heap.
const HEAP_SIZE: usize = 16 * 1024 * 1024;

/// Backing storage for the allocator’s heap, placed in a dedicated `.bss` section.
#[unsafe(link_section = ".bss.heap")]
static mut HEAP: HeapMem = HeapMem([0; HEAP_SIZE]);

/// Allocator state protected by a spinlock.
static ALLOC: SpinLock<FreeListAllocator> = SpinLock::new(FreeListAllocator::new());

/// One-time heap initialization flag.
static DID_INIT: AtomicBool = AtomicBool::new(false);

#[repr(align(4096))]
struct HeapMem([u8; HEAP_SIZE]);

/// Ensure the allocator is initialized (idempotent).
fn ensure_init() {
    if DID_INIT.load(Ordering::Acquire) {
        return;
    }
    ALLOC.with_lock_irq(|alloc| {
        if !alloc.is_initialized() {
            let start = (&raw const HEAP).cast::<u8>() as usize;
            // SAFETY: HEAP is only ever touched through ALLOC.
            unsafe { alloc.init(start, HEAP_SIZE) };
            DID_INIT.store(true, Ordering::Release);
        }
    });
}

/// The kernel's global allocator.
#[derive(Debug, Default, Copy, Clone)]
pub struct KernelHeap;

impl KernelHeap {
    /// Bytes currently free in the heap.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        ensure_init();
        ALLOC.with_lock_irq(|alloc| alloc.free_bytes())
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ensure_init();
        // SAFETY: the list is only walked under the lock.
        ALLOC.with_lock_irq(|alloc| unsafe { alloc.find_region(layout.size(), layout.align()) })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: `ptr` came from `alloc` with the same layout.
        ALLOC.with_lock_irq(|alloc| unsafe { alloc.deallocate(ptr, layout.size()) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_round_trip() {
        let heap = KernelHeap;
        let before = heap.free_bytes();
        let layout = Layout::from_size_align(100, 32).unwrap();
        unsafe {
            let p = heap.alloc(layout);
            assert!(!p.is_null());
            assert_eq!(p as usize % 32, 0);
            p.write_bytes(0xAB, 100);
            assert!(heap.free_bytes() < before);
            heap.dealloc(p, layout);
        }
        assert_eq!(heap.free_bytes(), before);
    }
}
