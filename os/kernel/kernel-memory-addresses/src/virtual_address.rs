use crate::{HIGHER_HALF_START, PageSize, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Virtual memory address.
///
/// A thin wrapper around `u64` that denotes **virtual** addresses. It does not
/// validate canonicality on construction; use [`is_canonical`](Self::is_canonical)
/// where the distinction matters (e.g., validating ELF load addresses).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
/// assert_eq!(va.page::<Size4K>().base().as_u64(), 0xFFFF_FFFF_8000_1000);
/// assert_eq!(va.page_offset(), 0x234);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Build a canonical address from four table indices (each `0..512`).
    ///
    /// Bit 47 is sign-extended into bits 63..48.
    #[inline]
    #[must_use]
    pub const fn from_indices(l4: usize, l3: usize, l2: usize, l1: usize) -> Self {
        let raw = ((l4 as u64 & 0x1FF) << 39)
            | ((l3 as u64 & 0x1FF) << 30)
            | ((l2 as u64 & 0x1FF) << 21)
            | ((l1 as u64 & 0x1FF) << 12);
        Self(sign_extend_48(raw))
    }

    /// 9-bit table index for paging `level` (4 = PML4, 3 = PDPT, 2 = PD, 1 = PT).
    #[inline]
    #[must_use]
    pub const fn table_index(self, level: u8) -> usize {
        debug_assert!(level >= 1 && level <= 4);
        ((self.0 >> (12 + 9 * (level as u32 - 1))) & 0x1FF) as usize
    }

    /// Byte offset inside the 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & 0xFFF
    }

    /// `true` if bits 63..48 are copies of bit 47.
    #[inline]
    #[must_use]
    pub const fn is_canonical(self) -> bool {
        sign_extend_48(self.0 & 0x0000_FFFF_FFFF_FFFF) == self.0
    }

    /// `true` for canonical addresses in the upper half (`>= 0xFFFF_8000_0000_0000`).
    #[inline]
    #[must_use]
    pub const fn is_higher_half(self) -> bool {
        self.0 >= HIGHER_HALF_START
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::containing_address(self)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: u64) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline]
    #[must_use]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

#[inline]
const fn sign_extend_48(raw: u64) -> u64 {
    if raw & (1 << 47) != 0 {
        raw | 0xFFFF_0000_0000_0000
    } else {
        raw
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl<S: PageSize> From<VirtualPage<S>> for VirtualAddress {
    fn from(value: VirtualPage<S>) -> Self {
        value.base()
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}
