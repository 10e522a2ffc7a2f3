//! Recursive walks over whole table hierarchies.

use crate::info::{APP_PML4_END, APP_PML4_START};
use crate::{Frame, FrameAlloc, PhysMapper, VmemError, alloc_zeroed, table_mut};
use core::ops::Range;
use kernel_memory_addresses::{ENTRIES_PER_TABLE, VirtualAddress};
use log::trace;

/// Copy entries `range` of the level-`level` table in `src` into the
/// level-`level` table in `dest`.
///
/// Every non-leaf entry gets a freshly allocated and zeroed child table in
/// `dest`, filled recursively; the source's intermediate tables are never
/// shared. Leaves are copied with the writable bit cleared, so both trees map
/// the same frames read-only until a write fault privatises the page.
///
/// `src` is not modified. Entries of `dest` inside `range` must be empty.
///
/// # Errors
/// [`VmemError::OutOfMemory`] if a child table cannot be allocated. The entry
/// in `dest` is only linked once its child is zeroed, so a partially copied
/// tree stays consistent and can be released by the usual teardown.
pub fn copy_hierarchy<M: PhysMapper, A: FrameAlloc>(
    mapper: &M,
    alloc: &mut A,
    dest: Frame,
    src: Frame,
    level: u8,
    range: Range<usize>,
) -> Result<(), VmemError> {
    debug_assert!((1..=4).contains(&level));
    let src_table = table_mut(mapper, src);
    let dest_table = table_mut(mapper, dest);
    for i in range {
        let e = src_table.get(i);
        if !e.present() {
            continue;
        }
        if e.is_leaf_at(level) {
            dest_table.set(i, e.with_writable(false));
            continue;
        }
        let child = alloc_zeroed(mapper, alloc)?;
        dest_table.set(i, e.with_frame(child));
        copy_hierarchy(mapper, alloc, child, e.frame(), level - 1, 0..ENTRIES_PER_TABLE)?;
    }
    Ok(())
}

/// Release the subtrees below entries `range` of the level-`level` `table`
/// and clear those entries.
///
/// Writable leaves are freed; read-only leaves are shared and only unlinked.
pub(super) fn free_subtrees<M: PhysMapper, A: FrameAlloc>(
    mapper: &M,
    alloc: &mut A,
    table: Frame,
    level: u8,
    range: Range<usize>,
) -> Result<(), VmemError> {
    let t = table_mut(mapper, table);
    for i in range {
        release_entry(mapper, alloc, t.get(i), level)?;
        t.clear(i);
    }
    Ok(())
}

/// Release everything mapped at or above `start` below the level-`level`
/// `table`.
///
/// Entries after `start`'s index are released wholesale. The entry at the
/// index is released wholesale if `start` is aligned to the range it covers,
/// and descended into otherwise. At the root, indices of the kernel half are
/// never touched.
pub(super) fn clean_from<M: PhysMapper, A: FrameAlloc>(
    mapper: &M,
    alloc: &mut A,
    table: Frame,
    level: u8,
    start: VirtualAddress,
) -> Result<(), VmemError> {
    let idx = start.table_index(level);
    if level == 4 && idx < APP_PML4_START {
        return free_subtrees(mapper, alloc, table, 4, APP_PML4_START..APP_PML4_END);
    }

    free_subtrees(mapper, alloc, table, level, idx + 1..ENTRIES_PER_TABLE)?;

    let t = table_mut(mapper, table);
    let e = t.get(idx);
    if !e.present() {
        return Ok(());
    }
    if e.is_leaf_at(level) || covers_from_start(start, level) {
        trace!("clean L{level}[{idx}] wholesale");
        release_entry(mapper, alloc, e, level)?;
        t.clear(idx);
        return Ok(());
    }
    clean_from(mapper, alloc, e.frame(), level - 1, start)
}

/// Free what `e` (found at `level`) owns: its child table and everything
/// below it, or the leaf frame if it is private.
fn release_entry<M: PhysMapper, A: FrameAlloc>(
    mapper: &M,
    alloc: &mut A,
    e: crate::PageEntryBits,
    level: u8,
) -> Result<(), VmemError> {
    if !e.present() {
        return Ok(());
    }
    if e.is_leaf_at(level) {
        if level == 1 && e.writable() {
            alloc.free_4k(e.frame())?;
        }
        return Ok(());
    }
    free_subtrees(mapper, alloc, e.frame(), level - 1, 0..ENTRIES_PER_TABLE)?;
    alloc.free_4k(e.frame())
}

/// `true` if `start` is the first address covered by its level-`level` entry.
const fn covers_from_start(start: VirtualAddress, level: u8) -> bool {
    let span_bits = 12 + 9 * (level as u32 - 1);
    start.as_u64() & ((1u64 << span_bits) - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_span_alignment() {
        let base = VirtualAddress::new(0xFFFF_8000_0000_0000);
        assert!(covers_from_start(base, 4));
        assert!(covers_from_start(base + 0x20_0000, 2));
        assert!(!covers_from_start(base + 0x20_0000, 3));
        assert!(covers_from_start(base + 0x1000, 1));
        assert!(!covers_from_start(base + 0x1000, 2));
    }
}
