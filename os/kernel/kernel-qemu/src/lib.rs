//! # QEMU debug console
//!
//! Kernel-to-host output through QEMU's debug console, I/O port `0x402`.
//! Start QEMU with `-debugcon stdio` (or `-debugcon file:debug.log`) to see it.
//!
//! - [`QemuLogger`] is the kernel's `log` backend.
//! - [`DebugConsole`] is a raw byte sink, used for application output while
//!   no window system is attached.
//! - [`qemu_trace!`] formats straight to the port, before the logger exists.
//!
//! Without the `enabled` feature, and on hosted builds, writes to the port
//! are dropped; everything else behaves the same.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod console;
mod logger;

pub use console::DebugConsole;
pub use logger::QemuLogger;

#[doc(hidden)]
pub mod qemu_fmt {
    use crate::DebugConsole;
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best effort; the console never fails.
        let _ = fmt::write(&mut DebugConsole, args);
    }
}

/// `print!` to the QEMU debug console.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
