use core::fmt;

/// QEMU's debug console port.
const QEMU_DEBUG_PORT: u16 = 0x402;

/// Byte sink over the debug console port.
#[derive(Debug, Default, Copy, Clone)]
pub struct DebugConsole;

impl DebugConsole {
    /// Write raw bytes, e.g. application output that need not be UTF-8.
    pub fn write_bytes(self, bytes: &[u8]) {
        for &b in bytes {
            putc(b);
        }
    }
}

impl fmt::Write for DebugConsole {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(all(feature = "enabled", target_arch = "x86_64", target_os = "none"))]
#[allow(clippy::inline_always)]
#[inline(always)]
fn putc(c: u8) {
    // SAFETY: port 0x402 has no side effects besides QEMU's console; on real
    // hardware it is unused.
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") QEMU_DEBUG_PORT,
            in("al") c,
            options(nomem, nostack, preserves_flags)
        );
    }
}

#[cfg(not(all(feature = "enabled", target_arch = "x86_64", target_os = "none")))]
#[inline]
const fn putc(_c: u8) {
    let _ = QEMU_DEBUG_PORT;
}
