//! # Saved Register Context
//!
//! The layout below is read and written by the context-switch assembly in the
//! kernel crate; the field offsets are part of that contract and are checked at
//! compile time.
//!
//! ```text
//! 0x000  cr3  rip  rflags  reserved1
//! 0x020  cs   ss   fs      gs
//! 0x040  rax  rbx  rcx     rdx  rdi  rsi  rsp  rbp
//! 0x080  r8   r9   r10     r11  r12  r13  r14  r15
//! 0x0C0  FXSAVE image (512 bytes, 16-byte aligned)
//! ```

use core::mem::offset_of;
use kernel_info::task::{FXSAVE_MXCSR_OFFSET, INITIAL_MXCSR};

/// 512-byte FXSAVE/FXRSTOR image.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub struct FxsaveArea(pub [u8; 512]);

impl FxsaveArea {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0; 512])
    }

    /// `MXCSR` as stored in the image.
    #[must_use]
    pub const fn mxcsr(&self) -> u32 {
        let b = &self.0;
        let o = FXSAVE_MXCSR_OFFSET;
        u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
    }

    pub fn set_mxcsr(&mut self, value: u32) {
        self.0[FXSAVE_MXCSR_OFFSET..FXSAVE_MXCSR_OFFSET + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Image of a fresh task: everything clear, SIMD exceptions masked.
    #[must_use]
    pub fn initial() -> Self {
        let mut area = Self::zeroed();
        area.set_mxcsr(INITIAL_MXCSR);
        area
    }
}

impl Default for FxsaveArea {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Register snapshot of a task that is not running.
#[repr(C, align(16))]
#[derive(Clone, Copy, Default)]
#[allow(clippy::struct_field_names)]
pub struct TaskContext {
    pub cr3: u64,
    pub rip: u64,
    pub rflags: u64,
    pub reserved1: u64,
    pub cs: u64,
    pub ss: u64,
    pub fs: u64,
    pub gs: u64,
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub fxsave_area: FxsaveArea,
}

const _: () = {
    assert!(offset_of!(TaskContext, cr3) == 0x00);
    assert!(offset_of!(TaskContext, rip) == 0x08);
    assert!(offset_of!(TaskContext, rflags) == 0x10);
    assert!(offset_of!(TaskContext, cs) == 0x20);
    assert!(offset_of!(TaskContext, ss) == 0x28);
    assert!(offset_of!(TaskContext, fs) == 0x30);
    assert!(offset_of!(TaskContext, gs) == 0x38);
    assert!(offset_of!(TaskContext, rax) == 0x40);
    assert!(offset_of!(TaskContext, rdi) == 0x60);
    assert!(offset_of!(TaskContext, rsi) == 0x68);
    assert!(offset_of!(TaskContext, rsp) == 0x70);
    assert!(offset_of!(TaskContext, rbp) == 0x78);
    assert!(offset_of!(TaskContext, r8) == 0x80);
    assert!(offset_of!(TaskContext, r15) == 0xB8);
    assert!(offset_of!(TaskContext, fxsave_area) == 0xC0);
    assert!(size_of::<TaskContext>() == 0x2C0);
    assert!(align_of::<TaskContext>() == 16);
};

impl TaskContext {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            cr3: 0,
            rip: 0,
            rflags: 0,
            reserved1: 0,
            cs: 0,
            ss: 0,
            fs: 0,
            gs: 0,
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rdi: 0,
            rsi: 0,
            rsp: 0,
            rbp: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            fxsave_area: FxsaveArea::zeroed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_fxsave_masks_simd_exceptions() {
        let area = FxsaveArea::initial();
        assert_eq!(area.mxcsr(), 0x1F80);
        assert_eq!(area.0[24..28], [0x80, 0x1F, 0, 0]);
        assert!(area.0[..24].iter().all(|&b| b == 0));
    }
}
