//! Host-side stand-ins for physical memory.
//!
//! [`TestPhys`] owns a pool of page-aligned frames on the heap and implements
//! [`PhysMapper`] for them; [`TestFrames`] hands the pool's frames out through
//! [`FrameAlloc`]. The two are separate values so a test can hold `&TestPhys`
//! in an [`AddressSpace`](crate::AddressSpace) while passing `&mut TestFrames`
//! to its methods.
//!
//! ```rust,ignore
//! # use kernel_vmem::testing::TestPhys;
//! # use kernel_vmem::FrameAlloc;
//! let phys = TestPhys::new(8);
//! let mut frames = phys.allocator();
//! let f = frames.alloc_4k().unwrap();
//! assert_eq!(frames.usage().allocated, 1);
//! frames.free_4k(f).unwrap();
//! assert!(frames.free_4k(f).is_err());
//! ```

use crate::{Frame, FrameAlloc, FrameUsage, PhysMapper, VmemError};
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_memory_addresses::PhysicalAddress;

/// Physical address of the first frame in a [`TestPhys`] pool.
pub const TEST_PHYS_BASE: u64 = 0x10_0000;

#[repr(C, align(4096))]
struct PoolFrame(UnsafeCell<[u8; 4096]>);

/// A fixed pool of fake physical frames starting at [`TEST_PHYS_BASE`].
pub struct TestPhys {
    frames: Box<[PoolFrame]>,
}

impl TestPhys {
    /// Create a pool of `frames` zeroed frames.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        let frames = (0..frames)
            .map(|_| PoolFrame(UnsafeCell::new([0; 4096])))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { frames }
    }

    /// Number of frames in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// A fresh allocator over every frame of this pool.
    #[must_use]
    pub fn allocator(&self) -> TestFrames {
        TestFrames::new(self.len())
    }
}

impl PhysMapper for TestPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let rel = pa.as_u64().checked_sub(TEST_PHYS_BASE).unwrap_or(u64::MAX);
        let index = usize::try_from(rel / 4096).unwrap_or(usize::MAX);
        assert!(index < self.frames.len(), "{pa:?} is outside the test pool");
        #[allow(clippy::cast_possible_truncation)]
        let offset = (rel % 4096) as usize;
        let base = self.frames[index].0.get().cast::<u8>();
        // SAFETY: the frame lives as long as the pool; the caller upholds the
        // aliasing contract of `PhysMapper`.
        unsafe { &mut *base.add(offset).cast::<T>() }
    }
}

/// Frame allocator over a [`TestPhys`] pool.
///
/// Always hands out the lowest free frame, so frame numbers are
/// deterministic across runs.
pub struct TestFrames {
    free: BTreeSet<u64>,
    allocated: BTreeSet<u64>,
    total: usize,
    /// Remaining allocations before the allocator reports exhaustion.
    budget: Option<usize>,
}

impl TestFrames {
    fn new(total: usize) -> Self {
        let free = (0..total as u64)
            .map(|i| TEST_PHYS_BASE + i * 4096)
            .collect();
        Self {
            free,
            allocated: BTreeSet::new(),
            total,
            budget: None,
        }
    }

    /// Fail every allocation after the next `n`.
    pub fn limit(&mut self, n: usize) {
        self.budget = Some(n);
    }

    /// Remove any limit set by [`limit`](Self::limit).
    pub fn unlimit(&mut self) {
        self.budget = None;
    }

    /// `true` if `frame` is currently handed out.
    #[must_use]
    pub fn is_allocated(&self, frame: Frame) -> bool {
        self.allocated.contains(&frame.base().as_u64())
    }
}

impl FrameAlloc for TestFrames {
    fn alloc_4k(&mut self) -> Option<Frame> {
        if let Some(budget) = self.budget.as_mut() {
            *budget = budget.checked_sub(1)?;
        }
        let pa = self.free.pop_first()?;
        self.allocated.insert(pa);
        Frame::from_aligned(PhysicalAddress::new(pa))
    }

    fn free_4k(&mut self, frame: Frame) -> Result<(), VmemError> {
        let pa = frame.base().as_u64();
        if !self.allocated.remove(&pa) {
            return Err(VmemError::FrameNotAllocated(frame.base()));
        }
        self.free.insert(pa);
        Ok(())
    }

    fn usage(&self) -> FrameUsage {
        FrameUsage {
            allocated: self.allocated.len(),
            total: self.total,
        }
    }
}
