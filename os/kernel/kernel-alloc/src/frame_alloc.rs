//! # Bitmap Physical Frame Allocator
//!
//! One bit per 4 KiB frame of physical memory, indexed by absolute frame
//! number (`pa / 4096`). A clear bit is free, a set bit is in use.
//!
//! The allocator starts out with an empty managed range. The boot code marks
//! every frame the firmware memory map does not report as usable with
//! [`mark_allocated`](BitmapFrameAlloc::mark_allocated) and then narrows the
//! search with [`set_range`](BitmapFrameAlloc::set_range).
//!
//! ```rust
//! # use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! # use kernel_memory_addresses::PhysicalAddress;
//! # use kernel_vmem::FrameAlloc;
//! let mut frames = BitmapFrameAlloc::<4>::new();
//! frames.set_range(1, 256);
//! let f = frames.alloc_4k().unwrap();
//! assert_eq!(f.base(), PhysicalAddress::new(0x1000));
//! frames.free_4k(f).unwrap();
//! ```

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::{Frame, FrameAlloc, FrameUsage, VmemError};
use log::trace;

const FRAME_SIZE: u64 = 4096;
const BITS_PER_WORD: usize = u64::BITS as usize;

/// Bitmap allocator covering `WORDS * 64` frames of physical memory.
pub struct BitmapFrameAlloc<const WORDS: usize> {
    bitmap: [u64; WORDS],
    /// First frame number handed out.
    range_begin: usize,
    /// One past the last frame number handed out.
    range_end: usize,
    /// Set bits inside `range_begin..range_end`.
    allocated: usize,
}

impl<const WORDS: usize> BitmapFrameAlloc<WORDS> {
    /// Largest frame number (exclusive) the bitmap can describe.
    pub const CAPACITY: usize = WORDS * BITS_PER_WORD;

    /// An allocator with every frame free and an empty managed range.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bitmap: [0; WORDS],
            range_begin: 0,
            range_end: 0,
            allocated: 0,
        }
    }

    /// Restrict allocation to frame numbers `begin..end`.
    ///
    /// `end` is clamped to [`CAPACITY`](Self::CAPACITY).
    pub fn set_range(&mut self, begin: usize, end: usize) {
        self.range_end = end.min(Self::CAPACITY);
        self.range_begin = begin.min(self.range_end);
        self.allocated = (self.range_begin..self.range_end)
            .filter(|&i| self.get_bit(i))
            .count();
    }

    /// Mark `count` frames starting at `first` as in use.
    ///
    /// Frames outside the bitmap are ignored.
    pub fn mark_allocated(&mut self, first: Frame, count: usize) {
        let start = frame_number(first);
        for i in start..start.saturating_add(count).min(Self::CAPACITY) {
            if !self.get_bit(i) {
                self.set_bit(i, true);
                if self.in_range(i) {
                    self.allocated += 1;
                }
            }
        }
    }

    const fn in_range(&self, i: usize) -> bool {
        i >= self.range_begin && i < self.range_end
    }

    const fn get_bit(&self, i: usize) -> bool {
        self.bitmap[i / BITS_PER_WORD] & (1 << (i % BITS_PER_WORD)) != 0
    }

    const fn set_bit(&mut self, i: usize, allocated: bool) {
        let mask = 1 << (i % BITS_PER_WORD);
        if allocated {
            self.bitmap[i / BITS_PER_WORD] |= mask;
        } else {
            self.bitmap[i / BITS_PER_WORD] &= !mask;
        }
    }

    /// First clear bit in the managed range, skipping full words.
    fn first_free(&self) -> Option<usize> {
        let mut i = self.range_begin;
        while i < self.range_end {
            let word = self.bitmap[i / BITS_PER_WORD];
            if i % BITS_PER_WORD == 0 && word == u64::MAX {
                i += BITS_PER_WORD;
                continue;
            }
            if !self.get_bit(i) {
                return Some(i);
            }
            i += 1;
        }
        None
    }
}

impl<const WORDS: usize> Default for BitmapFrameAlloc<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> FrameAlloc for BitmapFrameAlloc<WORDS> {
    fn alloc_4k(&mut self) -> Option<Frame> {
        let i = self.first_free()?;
        self.set_bit(i, true);
        self.allocated += 1;
        let frame = Frame::from_aligned(PhysicalAddress::new(i as u64 * FRAME_SIZE))?;
        trace!("alloc frame {:?}", frame.base());
        Some(frame)
    }

    fn free_4k(&mut self, frame: Frame) -> Result<(), VmemError> {
        let i = frame_number(frame);
        if i >= Self::CAPACITY || !self.get_bit(i) {
            return Err(VmemError::FrameNotAllocated(frame.base()));
        }
        self.set_bit(i, false);
        if self.in_range(i) {
            self.allocated -= 1;
        }
        trace!("free frame {:?}", frame.base());
        Ok(())
    }

    fn usage(&self) -> FrameUsage {
        FrameUsage {
            allocated: self.allocated,
            total: self.range_end - self.range_begin,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn frame_number(frame: Frame) -> usize {
    (frame.base().as_u64() / FRAME_SIZE) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u64) -> Frame {
        Frame::from_aligned(PhysicalAddress::new(n * FRAME_SIZE)).unwrap()
    }

    #[test]
    fn hands_out_lowest_free_frame_in_range() {
        let mut a = BitmapFrameAlloc::<2>::new();
        a.set_range(10, 20);
        assert_eq!(a.alloc_4k(), Some(frame(10)));
        assert_eq!(a.alloc_4k(), Some(frame(11)));
        a.free_4k(frame(10)).unwrap();
        assert_eq!(a.alloc_4k(), Some(frame(10)));
        assert_eq!(a.usage(), FrameUsage { allocated: 2, total: 10 });
    }

    #[test]
    fn reserved_frames_are_skipped() {
        let mut a = BitmapFrameAlloc::<2>::new();
        a.mark_allocated(frame(0), 64);
        a.set_range(0, 128);
        assert_eq!(a.usage().allocated, 64);
        assert_eq!(a.alloc_4k(), Some(frame(64)));
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut a = BitmapFrameAlloc::<1>::new();
        a.set_range(62, 100);
        assert_eq!(a.usage().total, 2);
        assert!(a.alloc_4k().is_some());
        assert!(a.alloc_4k().is_some());
        assert_eq!(a.alloc_4k(), None);
    }

    #[test]
    fn double_free_is_an_error() {
        let mut a = BitmapFrameAlloc::<1>::new();
        a.set_range(1, 64);
        let f = a.alloc_4k().unwrap();
        a.free_4k(f).unwrap();
        assert_eq!(
            a.free_4k(f),
            Err(VmemError::FrameNotAllocated(f.base()))
        );
        assert_eq!(a.usage().allocated, 0);
    }
}
