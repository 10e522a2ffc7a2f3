//! Page faults raised by applications, and the two ways an application
//! grows its address space: demand paging and memory-mapped files.
//!
//! ```text
//!  0xFFFF_8000_0000_0000 ┌──────────────────────┐
//!                        │ ELF segments         │ shared read-only, copy-on-write
//!       round_up(end) ── ├──────────────────────┤
//!                        │ demand-paged heap ↓  │ dpaging_begin..dpaging_end
//!                        ┆                      ┆
//!                        │ file maps ↑          │ ..file_map_end, grow downwards
//!   USER_STACK_BOTTOM ── ├──────────────────────┤
//!                        │ user stack (8 pages) │
//!          ARGS_FRAME ── ├──────────────────────┤
//!                        │ argv page            │
//!                        └──────────────────────┘
//! ```

use crate::FaultError;
use crate::process::{ProcessCtx, RootSwitch};
use bitfield_struct::bitfield;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{Size4K, VirtualAddress, align_down};
use kernel_task::{FdError, FileMapping, Task};
use kernel_vmem::{FrameAlloc, PhysMapper, VmemError};
use log::{debug, error, trace};

const PAGE_BYTES: usize = 4096;
const _: () = assert!(PAGE_BYTES as u64 == PAGE_SIZE);

/// Page-fault error code layout (x86-64).
///
/// Each bit describes the condition that caused the page fault.
/// Reference: Intel SDM Vol. 3A, §6.15.1 “Page-Fault Exception (#PF)”.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch (execute access).
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation (if CR4.PKE=1).
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access (if CET-SS enabled).
    pub shadow_stack: bool, // bit 6

    #[bits(57)]
    __: u64, // reserved / ignored bits
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (page not mapped or swapped out)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page (likely NX or SMEP)"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }

    /// A user-mode write to a present page: the only protection fault that
    /// can be resolved.
    #[must_use]
    pub const fn is_copy_on_write(&self) -> bool {
        self.present() && self.write() && self.user()
    }
}

/// Resolve a fault at `address` in the task's address space.
///
/// In order: copy-on-write of a shared page, a fresh zero page inside the
/// demand-paging window, a page of a memory-mapped file.
///
/// # Errors
/// - [`FaultError::AlreadyAllocated`] for any other protection fault.
/// - [`FaultError::IndexOutOfRange`] if `address` lies in no window.
/// - Memory and descriptor errors while resolving.
///
/// Every error is fatal to the application.
pub fn handle_page_fault<M, A, C>(
    ctx: &mut ProcessCtx<'_, M, A, C>,
    error: PageFaultError,
    address: VirtualAddress,
) -> Result<(), FaultError>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: RootSwitch,
{
    trace!("#PF at {address}: {}", error.explain());
    let result = resolve(ctx, error, address);
    if let Err(e) = &result {
        error!(
            "unresolvable page fault in {:?} at {address} ({:#x}): {e}",
            ctx.task.id(),
            error.into_bits()
        );
    }
    result
}

fn resolve<M, A, C>(
    ctx: &mut ProcessCtx<'_, M, A, C>,
    error: PageFaultError,
    address: VirtualAddress,
) -> Result<(), FaultError>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: RootSwitch,
{
    let space = ctx.address_space();
    if error.is_copy_on_write() {
        space.resolve_copy_on_write(ctx.frames, address)?;
        return Ok(());
    }
    if error.present() {
        return Err(FaultError::AlreadyAllocated(address));
    }

    let page = address.page::<Size4K>().base();
    if ctx.task.process().in_demand_window(address) {
        debug!("demand page {page}");
        space.map_region(ctx.frames, page, 1, true)?;
        return Ok(());
    }

    if let Some(mapping) = ctx.task.process().file_mapping_at(address) {
        space.map_region(ctx.frames, page, 1, true)?;
        let mut buf = [0u8; PAGE_BYTES];
        let read = load_file_page(ctx.task, &mapping, page, &mut buf)?;
        debug!("file map fd {} page {page}: {read} bytes", mapping.fd);
        space.write_bytes(page, &buf[..read])?;
        return Ok(());
    }

    Err(FaultError::IndexOutOfRange(address))
}

fn load_file_page(
    task: &mut Task,
    mapping: &FileMapping,
    page: VirtualAddress,
    buf: &mut [u8],
) -> Result<usize, FdError> {
    let offset = usize::try_from(page.as_u64() - mapping.vaddr_begin.as_u64())
        .map_err(|_| FdError::Unsupported)?;
    task.process_mut().files.get_mut(mapping.fd)?.load(buf, offset)
}

/// Grow the demand-paging window by `num_pages` and return its previous end,
/// the start of the new region. Nothing is mapped until first touched.
///
/// # Errors
/// [`VmemError::RegionOverflow`] if the window would grow into the file maps
/// or past the top of the address space. The window is left as it was.
pub fn demand_pages(task: &mut Task, num_pages: u64) -> Result<VirtualAddress, VmemError> {
    let process = task.process_mut();
    let previous = process.dpaging_end;
    let end = num_pages
        .checked_mul(PAGE_SIZE)
        .and_then(|len| previous.checked_add(len))
        .filter(|&end| end <= process.file_map_end)
        .ok_or(VmemError::RegionOverflow {
            start: previous,
            pages: num_pages,
        })?;
    process.dpaging_end = end;
    debug!("{:?} demand window now ends at {end}", task.id());
    Ok(previous)
}

/// Reserve address space for the whole of descriptor `fd` just below the
/// previous file mapping. Returns the start address and the file size.
///
/// # Errors
/// - [`FdError::BadFileDescriptor`] if `fd` is not open.
/// - [`VmemError::RegionOverflow`] if the file does not fit between the
///   demand-paging window and the previous mapping.
pub fn map_file(task: &mut Task, fd: usize) -> Result<(VirtualAddress, usize), FaultError> {
    let process = task.process_mut();
    let size = process.files.get_mut(fd)?.size();
    let vaddr_end = process.file_map_end;
    let vaddr_begin = vaddr_end
        .checked_sub(size as u64)
        .map(|va| VirtualAddress::new(align_down(va.as_u64(), PAGE_SIZE)))
        .filter(|&begin| begin >= process.dpaging_end)
        .ok_or(VmemError::RegionOverflow {
            start: vaddr_end,
            pages: (size as u64).div_ceil(PAGE_SIZE),
        })?;
    process.file_map_end = vaddr_begin;
    process.file_maps.push(FileMapping {
        fd,
        vaddr_begin,
        vaddr_end,
    });
    debug!("{:?} maps fd {fd} at {vaddr_begin}..{vaddr_end}", task.id());
    Ok((vaddr_begin, size))
}
