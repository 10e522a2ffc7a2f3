//! Page-aligned bases for virtual pages and physical frames.

use crate::{PageSize, PhysicalAddress, VirtualAddress, align_down};
use core::fmt;
use core::marker::PhantomData;

/// A page-aligned virtual base for a page of size `S`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize>(u64, PhantomData<S>);

/// A page-aligned physical base (frame) for a page of size `S`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize>(u64, PhantomData<S>);

impl<S: PageSize> VirtualPage<S> {
    /// The page that contains `va` (low bits cleared).
    #[inline]
    #[must_use]
    pub const fn containing_address(va: VirtualAddress) -> Self {
        Self(align_down(va.as_u64(), S::SIZE), PhantomData)
    }

    /// Construct from an already aligned address.
    ///
    /// Returns `None` if `va` is not aligned to `S::SIZE`.
    #[inline]
    #[must_use]
    pub const fn from_aligned(va: VirtualAddress) -> Option<Self> {
        if va.as_u64() & (S::SIZE - 1) == 0 {
            Some(Self(va.as_u64(), PhantomData))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    /// The following page. Wraps at the top of the address space.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(S::SIZE), PhantomData)
    }
}

impl<S: PageSize> PhysicalPage<S> {
    /// The frame that contains `pa` (low bits cleared).
    #[inline]
    #[must_use]
    pub const fn containing_address(pa: PhysicalAddress) -> Self {
        Self(align_down(pa.as_u64(), S::SIZE), PhantomData)
    }

    /// Construct from an already aligned address.
    #[inline]
    #[must_use]
    pub const fn from_aligned(pa: PhysicalAddress) -> Option<Self> {
        if pa.as_u64() & (S::SIZE - 1) == 0 {
            Some(Self(pa.as_u64(), PhantomData))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:016X})", self.0)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:016X})", self.0)
    }
}
