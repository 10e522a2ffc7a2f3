//! # Address Space (x86-64, PML4-rooted)
//!
//! Strongly-typed helpers to build, populate and tear down a **single**
//! virtual address space.
//!
//! ## Highlights
//!
//! - [`AddressSpace::create`] allocates a root and copies the kernel half.
//! - [`AddressSpace::map_region`] backs a page range with zero-filled frames.
//! - [`AddressSpace::translate`], [`read_bytes`](AddressSpace::read_bytes),
//!   [`write_bytes`](AddressSpace::write_bytes) and
//!   [`zero_bytes`](AddressSpace::zero_bytes) reach mapped memory through the
//!   [`PhysMapper`] without switching `CR3`.
//! - [`AddressSpace::resolve_copy_on_write`] privatises a shared leaf.
//! - [`AddressSpace::clean_region`] and [`AddressSpace::free_hierarchy`] tear
//!   the application half down again.
//!
//! Intermediate tables of the application half are always created present,
//! writable and user-accessible; the leaf carries the effective permission.

mod hierarchy;

pub use crate::address_space::hierarchy::copy_hierarchy;
use crate::address_space::hierarchy::{clean_from, free_subtrees};
use crate::info::{APP_PML4_END, APP_PML4_START, KERNEL_PML4_ENTRIES};
use crate::{
    FrameAlloc, PageEntryBits, PhysMapper, VmemError, alloc_zeroed, frame_bytes_mut, table_mut,
};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::{debug, trace};

/// The PML4 root page for an [`AddressSpace`].
pub type RootPage = PhysicalPage<Size4K>;

/// Handle to a single, concrete address space.
///
/// The handle does not own the tree; it is `Copy` and can be recreated from
/// the root frame at any time (e.g., from a task's saved `CR3`).
pub struct AddressSpace<'m, M: PhysMapper> {
    root: RootPage,
    mapper: &'m M,
}

impl<M: PhysMapper> Clone for AddressSpace<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: PhysMapper> Copy for AddressSpace<'_, M> {}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap an existing root frame.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: RootPage) -> Self {
        Self { root, mapper }
    }

    /// Allocate and zero a new root, then copy the kernel half
    /// (entries `0..256`) from `kernel_root`.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] if no frame is available.
    pub fn create<A: FrameAlloc>(
        mapper: &'m M,
        alloc: &mut A,
        kernel_root: RootPage,
    ) -> Result<Self, VmemError> {
        let root = alloc_zeroed(mapper, alloc)?;
        let src = table_mut(mapper, kernel_root);
        let dst = table_mut(mapper, root);
        for i in 0..KERNEL_PML4_ENTRIES {
            dst.set(i, src.get(i));
        }
        debug!("new address space root={:?}", root.base());
        Ok(Self { root, mapper })
    }

    /// Physical page of the PML4.
    #[inline]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// The mapper used to reach this tree.
    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Back `page_count` pages starting at `start` with zero-filled, user
    /// accessible frames.
    ///
    /// Missing intermediate tables are created. Pages that are already mapped
    /// keep their frame and flags, so the call is idempotent.
    ///
    /// # Errors
    /// - [`VmemError::OutOfMemory`] when a table or page frame cannot be
    ///   allocated. Pages mapped before the failure stay mapped.
    /// - [`VmemError::RegionOverflow`] if the range wraps past the top of the
    ///   address space.
    pub fn map_region<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        start: VirtualAddress,
        page_count: u64,
        writable: bool,
    ) -> Result<(), VmemError> {
        let first = start.page::<Size4K>().base();
        trace!("map_region {first} +{page_count} pages writable={writable}");
        for i in 0..page_count {
            let va = page_at(first, i, page_count)?;
            let (pt, idx) = self.walk_create(alloc, va)?;
            if pt.get(idx).present() {
                continue;
            }
            let frame = alloc_zeroed(self.mapper, alloc)?;
            pt.set(idx, PageEntryBits::user_leaf(frame, writable));
        }
        Ok(())
    }

    /// Unmap `page_count` pages starting at `start`.
    ///
    /// Private (writable) frames are returned to `alloc`; shared frames are
    /// only unlinked. Unmapped pages in the range are skipped. Emptied
    /// intermediate tables stay in place until teardown.
    ///
    /// # Errors
    /// Propagates [`FrameAlloc::free_4k`] failures and
    /// [`VmemError::RegionOverflow`].
    pub fn unmap_region<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        start: VirtualAddress,
        page_count: u64,
    ) -> Result<(), VmemError> {
        let first = start.page::<Size4K>().base();
        for i in 0..page_count {
            let va = page_at(first, i, page_count)?;
            let Some((pt, idx)) = self.walk(va) else {
                continue;
            };
            let leaf = pt.get(idx);
            if !leaf.present() {
                continue;
            }
            pt.clear(idx);
            if leaf.writable() {
                alloc.free_4k(leaf.frame())?;
            }
        }
        Ok(())
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (pt, idx) = self.walk(va)?;
        let leaf = pt.get(idx);
        leaf.present()
            .then(|| leaf.physical_address() + va.page_offset())
    }

    /// The leaf entry mapping `va`, if any table on the path exists.
    #[must_use]
    pub fn leaf_entry(&self, va: VirtualAddress) -> Option<PageEntryBits> {
        let (pt, idx) = self.walk(va)?;
        let leaf = pt.get(idx);
        leaf.present().then_some(leaf)
    }

    /// Copy mapped memory starting at `va` into `buf`.
    ///
    /// # Errors
    /// [`VmemError::NotMapped`] on the first unmapped page touched.
    pub fn read_bytes(&self, va: VirtualAddress, buf: &mut [u8]) -> Result<(), VmemError> {
        let mut done = 0;
        self.for_each_chunk(va, buf.len(), |page, off, len| {
            buf[done..done + len].copy_from_slice(&page[off..off + len]);
            done += len;
        })
    }

    /// Copy `bytes` into mapped memory starting at `va`.
    ///
    /// Writes go through the physical mapper, so the leaf's writable bit is
    /// not consulted. This is how the loader fills read-only segments.
    ///
    /// # Errors
    /// [`VmemError::NotMapped`] on the first unmapped page touched.
    pub fn write_bytes(&self, va: VirtualAddress, bytes: &[u8]) -> Result<(), VmemError> {
        let mut done = 0;
        self.for_each_chunk(va, bytes.len(), |page, off, len| {
            page[off..off + len].copy_from_slice(&bytes[done..done + len]);
            done += len;
        })
    }

    /// Zero `len` bytes of mapped memory starting at `va`.
    ///
    /// # Errors
    /// [`VmemError::NotMapped`] on the first unmapped page touched.
    pub fn zero_bytes(&self, va: VirtualAddress, len: usize) -> Result<(), VmemError> {
        self.for_each_chunk(va, len, |page, off, n| page[off..off + n].fill(0))
    }

    /// Give this address space a private, writable copy of the shared page
    /// mapping `va`.
    ///
    /// The shared frame is left untouched (it still belongs to its template).
    ///
    /// # Errors
    /// - [`VmemError::NotMapped`] if no leaf maps `va`.
    /// - [`VmemError::NotShared`] if the leaf is already writable.
    /// - [`VmemError::OutOfMemory`] if no frame is available for the copy.
    pub fn resolve_copy_on_write<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<(), VmemError> {
        let (pt, idx) = self.walk(va).ok_or(VmemError::NotMapped(va))?;
        let leaf = pt.get(idx);
        if !leaf.present() {
            return Err(VmemError::NotMapped(va));
        }
        if leaf.writable() {
            return Err(VmemError::NotShared(va));
        }
        let copy = alloc.alloc_4k().ok_or(VmemError::OutOfMemory)?;
        let src = frame_bytes_mut(self.mapper, leaf.frame());
        frame_bytes_mut(self.mapper, copy).copy_from_slice(&src[..]);
        pt.set(idx, leaf.with_frame(copy).with_writable(true));
        debug!(
            "copy-on-write {} {:?} -> {:?}",
            va.page::<Size4K>().base(),
            leaf.physical_address(),
            copy.base()
        );
        Ok(())
    }

    /// Copy the application half (`256..512`) of `template` into this
    /// address space, sharing its leaves read-only.
    ///
    /// # Errors
    /// [`VmemError::OutOfMemory`] while allocating intermediate tables. The
    /// partially copied tree remains valid and is released by
    /// [`free_hierarchy`](Self::free_hierarchy).
    pub fn copy_app_half_from<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        template: RootPage,
    ) -> Result<(), VmemError> {
        copy_hierarchy(
            self.mapper,
            alloc,
            self.root,
            template,
            4,
            APP_PML4_START..APP_PML4_END,
        )
    }

    /// Unmap and free everything mapped at or above `start`.
    ///
    /// Root entries of the kernel half are never touched, whatever `start` is.
    /// Fully covered tables are freed together with their private leaves.
    ///
    /// # Errors
    /// Propagates [`FrameAlloc::free_4k`] failures.
    pub fn clean_region<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        start: VirtualAddress,
    ) -> Result<(), VmemError> {
        debug!("clean_region root={:?} from {start}", self.root.base());
        let start = start.page::<Size4K>().base();
        clean_from(self.mapper, alloc, self.root, 4, start)
    }

    /// Release every table and private leaf of the application half, then
    /// the root frame itself.
    ///
    /// The kernel half is shared and never released.
    ///
    /// # Errors
    /// Propagates [`FrameAlloc::free_4k`] failures; the tree is left partially
    /// released in that case.
    pub fn free_hierarchy<A: FrameAlloc>(self, alloc: &mut A) -> Result<(), VmemError> {
        debug!("free address space root={:?}", self.root.base());
        free_subtrees(
            self.mapper,
            alloc,
            self.root,
            4,
            APP_PML4_START..APP_PML4_END,
        )?;
        alloc.free_4k(self.root)
    }

    /// Walk to the level-1 table mapping `va`, creating missing tables.
    fn walk_create<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<(&'m mut crate::PageTable, usize), VmemError> {
        let mut table = table_mut(self.mapper, self.root);
        for level in (2..=4u8).rev() {
            let idx = va.table_index(level);
            let e = table.get(idx);
            let next = if e.present() {
                e.frame()
            } else {
                let frame = alloc_zeroed(self.mapper, alloc)?;
                table.set(idx, PageEntryBits::user_table(frame));
                frame
            };
            table = table_mut(self.mapper, next);
        }
        Ok((table, va.table_index(1)))
    }

    /// Walk to the level-1 table mapping `va` without creating anything.
    fn walk(&self, va: VirtualAddress) -> Option<(&'m mut crate::PageTable, usize)> {
        let mut table = table_mut(self.mapper, self.root);
        for level in (2..=4u8).rev() {
            let e = table.get(va.table_index(level));
            if !e.present() || e.large_page() {
                return None;
            }
            table = table_mut(self.mapper, e.frame());
        }
        Some((table, va.table_index(1)))
    }

    /// Visit `len` bytes starting at `va` page by page as
    /// `(frame bytes, offset in frame, chunk length)`.
    fn for_each_chunk(
        &self,
        va: VirtualAddress,
        len: usize,
        mut f: impl FnMut(&mut [u8; 4096], usize, usize),
    ) -> Result<(), VmemError> {
        let mut cursor = va;
        let mut remaining = len;
        while remaining > 0 {
            let leaf = self.leaf_entry(cursor).ok_or(VmemError::NotMapped(cursor))?;
            #[allow(clippy::cast_possible_truncation)]
            let off = cursor.page_offset() as usize;
            let n = remaining.min(Size4K::SIZE as usize - off);
            f(frame_bytes_mut(self.mapper, leaf.frame()), off, n);
            remaining -= n;
            if remaining > 0 {
                cursor = cursor
                    .checked_add(n as u64)
                    .ok_or(VmemError::NotMapped(cursor))?;
            }
        }
        Ok(())
    }
}

/// Base of page `i` of a `count`-page region starting at `first`.
fn page_at(first: VirtualAddress, i: u64, count: u64) -> Result<VirtualAddress, VmemError> {
    i.checked_mul(Size4K::SIZE)
        .and_then(|off| first.checked_add(off))
        .ok_or(VmemError::RegionOverflow {
            start: first,
            pages: count,
        })
}

#[cfg(test)]
mod tests;
