use crate::Frame;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A single 64-bit x86-64 paging-structure entry in its raw bitfield form.
///
/// The same layout is used at every level. An entry either points to the
/// next-level table or, at level 1 (or with `large_page` set at levels 2/3),
/// maps a physical page.
///
/// ### Bit layout
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty (leaf only) |
/// | 7         | `PS`              | Large page flag |
/// | 8         | `G`               | Global (leaf only) |
/// | 9–11      | OS avail low      | Reserved for OS use |
/// | 12–51     | `addr`            | Physical frame bits [51:12] |
/// | 52–62     | OS avail high     | Reserved for OS use |
/// | 63        | `NX`              | Execute disable |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::user_leaf(PhysicalAddress::new(0x5000).page(), false);
/// assert!(e.present());
/// assert!(e.user_access());
/// assert!(!e.writable());
/// assert_eq!(e.frame().base().as_u64(), 0x5000);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// On leaves of application pages this doubles as the ownership marker:
    /// writable frames are private, read-only frames are shared.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), leaf only. Set by the CPU on first write.
    pub dirty: bool,

    /// Large Page / Page Size (PS, bit 7).
    ///
    /// Only the kernel half may contain large pages; they are treated as
    /// leaves when walking.
    pub large_page: bool,

    /// Global (G, bit 8), leaf only.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available_low: u8,

    /// Physical address bits [51:12].
    #[bits(40)]
    phys_addr_bits_51_12: u64,

    /// OS-available (bits 52..=62).
    #[bits(11)]
    pub os_available_high: u16,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    /// Physical address stored in the entry (low 12 bits clear).
    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_bits_51_12() << 12)
    }

    /// The frame the entry points at (next table or mapped page).
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Frame {
        Frame::containing_address(self.physical_address())
    }

    /// Replace the frame while keeping all flag bits.
    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: Frame) -> Self {
        self.with_phys_addr_bits_51_12(frame.base().as_u64() >> 12)
    }

    /// Non-leaf link to a next-level table of an application region.
    ///
    /// Present, writable and user-accessible; the leaf decides the effective
    /// permissions.
    #[inline]
    #[must_use]
    pub const fn user_table(next: Frame) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
            .with_frame(next)
    }

    /// 4 KiB leaf mapping an application page.
    #[inline]
    #[must_use]
    pub const fn user_leaf(page: Frame, writable: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(writable)
            .with_user_access(true)
            .with_frame(page)
    }

    /// `true` if walking stops at this entry when found at `level`.
    #[inline]
    #[must_use]
    pub const fn is_leaf_at(&self, level: u8) -> bool {
        level == 1 || self.large_page()
    }
}
