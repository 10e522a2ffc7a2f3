//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and 4 KiB page bases used
//! by the paging, loader and scheduler crates.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | An address translated by the page tables. |
//! | [`PhysicalAddress`] | An address in physical memory (frame or MMIO). |
//! | [`VirtualPage<S>`] | Page-aligned virtual base of a page of size `S`. |
//! | [`PhysicalPage<S>`] | Page-aligned physical base of a frame of size `S`. |
//!
//! Keeping the two address kinds apart at the type level means a page-table
//! walker can never be handed a user pointer where it expects a frame.
//!
//! ## x86-64 four-level split
//!
//! ```text
//! | 63‒48 sign | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  extension |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! [`VirtualAddress::table_index`] extracts the 9-bit index for a given level
//! (4 = PML4 … 1 = PT). Addresses are **canonical** when bits 63‒48 replicate
//! bit 47; [`VirtualAddress::is_higher_half`] checks for the upper canonical
//! range starting at [`HIGHER_HALF_START`].
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xFFFF_8000_0040_1234);
//! assert!(va.is_canonical());
//! assert!(va.is_higher_half());
//! assert_eq!(va.table_index(4), 256);
//! assert_eq!(va.page::<Size4K>().base().as_u64(), 0xFFFF_8000_0040_1000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page;
mod physical_address;
mod virtual_address;

use core::fmt;
use core::hash::Hash;

pub use page::{PhysicalPage, VirtualPage};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// First address of the canonical upper half.
pub const HIGHER_HALF_START: u64 = 0xFFFF_8000_0000_0000;

/// Number of entries in each paging structure.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;
}

/// 4 KiB page (4096 bytes). The only granularity the process layer maps.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const SHIFT: u32 = 12;
}

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two and `x + a - 1` must not overflow.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(1, 4096), 4096);
/// assert_eq!(align_up(4096, 4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> u64 {
    (x + a - 1) & !(a - 1)
}

/// Number of 4 KiB pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(Size4K::SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_indices_split_the_address() {
        let va = VirtualAddress::new(0xFFFF_8000_0040_3000);
        assert_eq!(va.table_index(4), 256);
        assert_eq!(va.table_index(3), 0);
        assert_eq!(va.table_index(2), 2);
        assert_eq!(va.table_index(1), 3);
    }

    #[test]
    fn from_indices_builds_canonical_addresses() {
        let va = VirtualAddress::from_indices(511, 511, 511, 511);
        assert_eq!(va.as_u64(), 0xFFFF_FFFF_FFFF_F000);
        assert!(va.is_canonical());

        let low = VirtualAddress::from_indices(1, 0, 0, 0);
        assert_eq!(low.as_u64(), 0x0000_0080_0000_0000);
        assert!(!low.is_higher_half());
    }

    #[test]
    fn canonical_checks() {
        assert!(VirtualAddress::new(0x0000_7FFF_FFFF_FFFF).is_canonical());
        assert!(!VirtualAddress::new(0x0000_8000_0000_0000).is_canonical());
        assert!(VirtualAddress::new(HIGHER_HALF_START).is_higher_half());
        assert!(!VirtualAddress::new(HIGHER_HALF_START - 1).is_higher_half());
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(4096), 1);
        assert_eq!(pages_for(4097), 2);
    }

    #[test]
    fn pages_align_down() {
        let pp = PhysicalPage::<Size4K>::containing_address(PhysicalAddress::new(0x1234_5678));
        assert_eq!(pp.base().as_u64(), 0x1234_5000);
        let vp = VirtualPage::<Size4K>::containing_address(VirtualAddress::new(0xFFFF_8000_0000_0FFF));
        assert_eq!(vp.base().as_u64(), HIGHER_HALF_START);
        assert_eq!(vp.next().base().as_u64(), HIGHER_HALF_START + 4096);
    }
}
