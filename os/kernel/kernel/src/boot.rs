//! What the boot loader hands to the kernel.

/// Boot information passed in `RDI` to `_start_kernel`.
///
/// The loader has already installed a root table whose lower half maps all
/// physical memory at [`PHYS_MAP_BASE`](kernel_info::memory::PHYS_MAP_BASE);
/// that table becomes the kernel root.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootInfo {
    /// First physical frame number free for general use.
    pub usable_frames_begin: u64,
    /// One past the last usable frame number.
    pub usable_frames_end: u64,
}

impl BootInfo {
    /// The usable frame range, clamped to the address width of the host.
    #[must_use]
    pub fn usable_frames(&self) -> (usize, usize) {
        let clamp = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
        (clamp(self.usable_frames_begin), clamp(self.usable_frames_end))
    }
}
