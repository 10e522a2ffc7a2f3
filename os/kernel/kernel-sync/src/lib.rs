//! # Kernel synchronization primitives
//!
//! The kernel runs on a single logical core; masking interrupts is the only
//! real mutual exclusion. [`IrqGuard`] masks them for a scope and restores the
//! previous state on every exit path. [`SpinLock::lock_irq`] pairs that guard
//! with a spin lock for the kernel singletons.
//!
//! ## Hosted builds
//!
//! On a hosted target (anything but `target_os = "none"`) `cli`/`sti` would
//! fault, so the interrupt flag is emulated per thread. The emulated flag
//! starts out enabled, which matches a kernel that has finished booting.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(not(target_os = "none"))]
extern crate std;

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{IrqGuard, interrupts_enabled};
pub use spin_lock::{SpinLock, SpinLockGuard, SpinLockIrqGuard};
pub use sync_once_cell::SyncOnceCell;
