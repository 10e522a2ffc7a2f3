//! # Kernel
//!
//! Ties the task and process layers to the machine.
//!
//! - [`KernelContext`]: the one instance of every scheduler and memory
//!   structure, built at boot and kept behind an interrupt-masking lock.
//! - [`KernelHost`]: launches applications against that lock.
//! - [`console`]: the standard streams of applications.
//! - `arch` (bare-metal builds only): context-switch and user-mode entry
//!   assembly, the kernel singleton, interrupt entry points.
//!
//! Everything except `arch` is hardware independent and tested on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod arch;
pub mod boot;
pub mod console;
mod context;
mod host;

pub use crate::context::KernelContext;
pub use crate::host::{EnterUser, KernelHost};
