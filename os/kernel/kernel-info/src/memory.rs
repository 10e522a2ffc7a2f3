//! # Memory Layout

use kernel_memory_addresses::{HIGHER_HALF_START, Size4K, PageSize};

/// Size of a single page and physical frame in bytes.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// Number of root (PML4) entries owned by the kernel.
///
/// Entries `0..KERNEL_PML4_ENTRIES` are copied verbatim into every new
/// address space; entries `KERNEL_PML4_ENTRIES..512` belong to the application.
pub const KERNEL_PML4_ENTRIES: usize = 256;

/// First root-table index of the application half.
pub const APP_PML4_START: usize = KERNEL_PML4_ENTRIES;

/// One past the last root-table index of the application half.
pub const APP_PML4_END: usize = 512;

/// Lowest virtual address an application may be loaded at.
pub const APP_REGION_START: u64 = HIGHER_HALF_START;

/// The page that holds `argv` and the argument strings.
pub const ARGS_FRAME: u64 = 0xFFFF_FFFF_FFFF_F000;

/// Number of pointer slots in the `argv` array at the start of [`ARGS_FRAME`].
pub const ARGV_LEN: usize = 32;

/// Bytes available for argument strings behind the `argv` array.
pub const ARGBUF_LEN: usize = PAGE_SIZE as usize - ARGV_LEN * size_of::<u64>();

/// Number of pages in the user stack.
pub const USER_STACK_PAGES: u64 = 8;

/// Size of the user stack in bytes.
pub const USER_STACK_SIZE: u64 = USER_STACK_PAGES * PAGE_SIZE;

/// Lowest address of the user stack; it ends where [`ARGS_FRAME`] begins.
pub const USER_STACK_BOTTOM: u64 = ARGS_FRAME - USER_STACK_SIZE;

/// Physical memory is identity-mapped in the kernel half.
///
/// A physical address `pa` is reachable by the kernel at `PHYS_MAP_BASE + pa`.
pub const PHYS_MAP_BASE: u64 = 0;

const _: () = {
    assert!(KERNEL_PML4_ENTRIES == 256);
    assert!(APP_REGION_START == 0xFFFF_8000_0000_0000);
    assert!(ARGS_FRAME.is_multiple_of(PAGE_SIZE));
    assert!(USER_STACK_BOTTOM > APP_REGION_START);
    assert!(USER_STACK_BOTTOM + USER_STACK_SIZE == ARGS_FRAME);
    assert!(ARGBUF_LEN == 4096 - 256);
};
