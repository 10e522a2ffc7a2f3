//! Scoped interrupt masking.

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt flag (`RFLAGS.IF`). If interrupts
/// were enabled, it executes `cli`. On drop, it executes `sti` **only** if
/// they were previously enabled, so nested guards compose.
///
/// # Examples
///
/// ```
/// use kernel_sync::{IrqGuard, interrupts_enabled};
///
/// assert!(interrupts_enabled());
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
///     {
///         let _inner = IrqGuard::new();
///     }
///     assert!(!interrupts_enabled());
/// }
/// assert!(interrupts_enabled());
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = arch::interrupts_enabled();
        if enabled {
            arch::disable();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    /// Restores interrupts (`sti`) only if they were previously enabled.
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable();
        }
    }
}

/// Whether interrupts are currently enabled (`RFLAGS.IF`).
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::interrupts_enabled()
}

/// Unconditionally enable interrupts.
///
/// Used by the idle loop and by freshly started tasks.
///
/// # Safety
/// Interrupt handlers may run immediately; no `IrqGuard` may be live in the
/// current scope.
#[inline]
pub unsafe fn enable() {
    arch::enable();
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    const RFLAGS_IF: u64 = 1 << 9;

    #[inline]
    pub fn interrupts_enabled() -> bool {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nomem, preserves_flags)) }
        r & RFLAGS_IF != 0
    }

    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    use core::cell::Cell;

    std::thread_local! {
        static INTERRUPT_FLAG: Cell<bool> = const { Cell::new(true) };
    }

    #[inline]
    pub fn interrupts_enabled() -> bool {
        INTERRUPT_FLAG.with(Cell::get)
    }

    #[inline]
    pub fn disable() {
        INTERRUPT_FLAG.with(|f| f.set(false));
    }

    #[inline]
    pub fn enable() {
        INTERRUPT_FLAG.with(|f| f.set(true));
    }
}
