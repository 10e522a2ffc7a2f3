//! # Virtual Memory Support
//!
//! Four-level x86-64 page-table management for per-task address spaces.
//!
//! ## What you get
//! - [`AddressSpace`]: a handle to one page-table tree rooted at a PML4 frame,
//!   with region mapping, translation, byte-level access to mapped memory,
//!   copy-on-write resolution and teardown.
//! - [`copy_hierarchy`]: copy a contiguous slice of entries at any level,
//!   sharing leaf frames read-only (copy-on-write).
//! - [`PageEntryBits`] and [`PageTable`]: the raw entry bitfield and the
//!   4 KiB-aligned table of 512 entries.
//! - [`FrameAlloc`] and [`PhysMapper`]: the two seams to the rest of the kernel
//!   (where frames come from, and how the kernel reaches a physical frame).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Each level holds 512 entries of 8 bytes. Levels are numbered the way the
//! walk descends: `4` is the root (PML4), `1` is the page table whose entries
//! map 4 KiB frames. This crate only ever creates 4 KiB leaves.
//!
//! ## Kernel half and application half
//!
//! Entries `0..256` of every root belong to the kernel and are copied from the
//! kernel's root when an address space is created; they are never freed here.
//! Entries `256..512` (virtual addresses `0xFFFF_8000_0000_0000` and above)
//! belong to the application running in the address space.
//!
//! ## Frame ownership
//!
//! A **writable** leaf frame belongs to the address space that maps it and is
//! released by [`AddressSpace::free_hierarchy`], [`AddressSpace::clean_region`]
//! and [`AddressSpace::unmap_region`]. A **read-only** leaf is shared with
//! the template it was copied from and is never released by the sharer.
//! A write fault on a shared leaf is resolved with
//! [`AddressSpace::resolve_copy_on_write`], which gives the faulting space a
//! private writable copy.
//!
//! ## TLB maintenance
//!
//! This crate does not issue `invlpg`. Pages are only ever added or upgraded
//! while an address space is live (a faulting access re-walks the tables), and
//! teardown is followed by a `CR3` reload in the caller.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

pub mod address_space;
mod page_entry_bits;
mod page_table;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crate::address_space::{AddressSpace, RootPage, copy_hierarchy};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::PageTable;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// A 4 KiB physical frame.
pub type Frame = PhysicalPage<Size4K>;

/// Errors raised by the page-table manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmemError {
    /// The frame allocator is exhausted.
    #[error("out of physical memory")]
    OutOfMemory,
    /// No present leaf maps the address.
    #[error("virtual address {0} is not mapped")]
    NotMapped(VirtualAddress),
    /// A copy-on-write fault hit a page that is already private and writable.
    #[error("page at {0} is not a shared read-only page")]
    NotShared(VirtualAddress),
    /// The requested page range runs past the top of the address space.
    #[error("{pages} pages starting at {start} exceed the address space")]
    RegionOverflow { start: VirtualAddress, pages: u64 },
    /// A frame was returned that the allocator never handed out.
    #[error("frame {0} is not allocated")]
    FrameNotAllocated(PhysicalAddress),
}

/// Frame allocator statistics.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FrameUsage {
    /// Frames currently handed out.
    pub allocated: usize,
    /// Frames managed by the allocator.
    pub total: usize,
}

/// Source of **physical** 4 KiB frames for page tables and page contents.
///
/// Returned frames **must** be 4 KiB aligned. Their contents are unspecified;
/// callers zero what they use.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame. `None` on exhaustion.
    fn alloc_4k(&mut self) -> Option<Frame>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    ///
    /// # Errors
    /// [`VmemError::FrameNotAllocated`] if the frame is not currently allocated.
    fn free_4k(&mut self, frame: Frame) -> Result<(), VmemError>;

    /// Allocated and total frame counts.
    fn usage(&self) -> FrameUsage;
}

/// Converts physical addresses to usable references in the current virtual
/// address space (identity map or a higher-half direct map).
///
/// # Safety
/// - `pa` must be mapped writable in the current page tables for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Borrow the page table stored in `frame`.
#[inline]
#[allow(clippy::mut_from_ref)]
pub(crate) fn table_mut<'a, M: PhysMapper>(m: &M, frame: Frame) -> &'a mut PageTable {
    // SAFETY: every frame handed to this helper holds a page table owned by
    // the tree being walked.
    unsafe { m.phys_to_mut::<PageTable>(frame.base()) }
}

/// Borrow the raw bytes of `frame`.
#[inline]
#[allow(clippy::mut_from_ref)]
pub(crate) fn frame_bytes_mut<'a, M: PhysMapper>(m: &M, frame: Frame) -> &'a mut [u8; 4096] {
    // SAFETY: leaf frames are plain data pages.
    unsafe { m.phys_to_mut::<[u8; 4096]>(frame.base()) }
}

/// Allocate a frame and clear it.
pub(crate) fn alloc_zeroed<A: FrameAlloc, M: PhysMapper>(
    m: &M,
    alloc: &mut A,
) -> Result<Frame, VmemError> {
    let frame = alloc.alloc_4k().ok_or(VmemError::OutOfMemory)?;
    frame_bytes_mut(m, frame).fill(0);
    Ok(frame)
}
