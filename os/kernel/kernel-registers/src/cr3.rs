use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// CR3: page-map level-4 base register (PCID disabled).
///
/// Every task stores the raw value in its saved context; the context switch
/// reloads it, which also flushes non-global TLB entries.
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–2, reserved.
    #[bits(3)]
    __: u8,

    /// Bit 3, PWT: write-through for root-table accesses.
    pub pwt: bool,

    /// Bit 4, PCD: cache disable for root-table accesses.
    pub pcd: bool,

    /// Bits 5–11, reserved.
    #[bits(7)]
    __: u8,

    /// Bits 12–51, root-table physical base >> 12.
    #[bits(40)]
    root_4k: u64,

    /// Bits 52–63, reserved.
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// `CR3` value selecting the root table at `root` with default caching.
    #[must_use]
    pub const fn from_root(root: PhysicalAddress) -> Self {
        debug_assert!(root.as_u64() & 0xFFF == 0, "root table must be 4K-aligned");
        Self::new().with_root_4k(root.as_u64() >> 12)
    }

    /// Physical address of the root table.
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.root_4k() << 12)
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_roundtrips_through_bits() {
        let cr3 = Cr3::from_root(PhysicalAddress::new(0x0012_3000));
        assert_eq!(cr3.into_bits(), 0x0012_3000);
        assert_eq!(cr3.root().as_u64(), 0x0012_3000);
    }

    #[test]
    fn cache_bits_do_not_leak_into_root() {
        let cr3 = Cr3::from_bits(0x0040_0018);
        assert!(cr3.pwt());
        assert!(cr3.pcd());
        assert_eq!(cr3.root().as_u64(), 0x0040_0000);
    }
}
