//! # Direct-map `PhysMapper`
//!
//! The kernel half of every address space maps all of physical memory at
//! [`PHYS_MAP_BASE`] (currently `0`, i.e. identity). Page tables and frame
//! contents are reached by adding that base to the physical address.
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::{PageTable, PhysMapper};
//! let mapper = HhdmPhysMapper;
//! unsafe {
//!     let table: &mut PageTable = mapper.phys_to_mut(PhysicalAddress::new(0x1234_0000));
//!     table.zero();
//! }
//! ```

use kernel_info::memory::PHYS_MAP_BASE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] over the kernel's direct map of physical memory.
///
/// # Safety
/// - The direct map must be present and cover the referenced physical range.
/// - The returned reference must only be used for valid, mapped and writable memory.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = (PHYS_MAP_BASE + pa.as_u64()) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and direct-mapped.
        unsafe { &mut *va }
    }
}
