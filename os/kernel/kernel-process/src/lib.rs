//! # Processes
//!
//! Everything between "the shell found an executable" and "the application
//! returned":
//!
//! - [`elf`]: validating an ELF64 image and walking its `PT_LOAD` segments.
//! - [`loader::load_app`]: building the image into an address space, with
//!   [`AppLoadCache`] templates shared copy-on-write between runs.
//! - [`launch::execute_file`]: argument page, stack, standard streams,
//!   user-mode entry and teardown.
//! - [`fault`]: resolving application page faults (copy-on-write, demand
//!   paging, memory-mapped files).
//! - [`terminal::TerminalFd`]: the standard streams.
//!
//! All operations work on a [`ProcessCtx`], a borrowed view of the kernel
//! state taken while interrupts are masked. Hardware access goes through
//! [`RootSwitch`] and [`LaunchHost`], so the crate runs unchanged in host
//! tests.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod args;
pub mod cache;
pub mod elf;
pub mod fault;
pub mod fs;
pub mod launch;
pub mod loader;
mod process;
pub mod terminal;
#[cfg(test)]
mod test_image;

pub use crate::cache::{AppLoadCache, AppLoadInfo};
pub use crate::launch::{AppCall, LaunchConfig, LaunchHost, execute_file};
pub use crate::process::{ProcessCtx, RootSwitch};

use crate::elf::ElfErr;
use kernel_memory_addresses::VirtualAddress;
use kernel_task::FdError;
use kernel_vmem::VmemError;

/// Errors raised while loading an image.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LoadError {
    /// The file is not an ELF image.
    #[error("not an executable file")]
    InvalidFile,
    #[error("invalid executable: {0}")]
    InvalidFormat(ElfErr),
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Memory(VmemError),
}

impl From<ElfErr> for LoadError {
    fn from(e: ElfErr) -> Self {
        match e {
            ElfErr::BadMagic => Self::InvalidFile,
            e => Self::InvalidFormat(e),
        }
    }
}

impl From<VmemError> for LoadError {
    fn from(e: VmemError) -> Self {
        match e {
            VmemError::OutOfMemory => Self::OutOfMemory,
            e => Self::Memory(e),
        }
    }
}

/// Errors raised while launching or tearing down an application.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The argument page cannot hold all arguments.
    #[error("too many arguments")]
    Full,
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Memory(VmemError),
    #[error("no such file")]
    NoSuchFile,
    #[error("not a file")]
    NotAFile,
    /// The output sink refused the exit report.
    #[error("terminal output failed")]
    Output,
}

impl From<VmemError> for ExecError {
    fn from(e: VmemError) -> Self {
        match e {
            VmemError::OutOfMemory => Self::OutOfMemory,
            e => Self::Memory(e),
        }
    }
}

impl From<core::fmt::Error> for ExecError {
    fn from(_: core::fmt::Error) -> Self {
        Self::Output
    }
}

/// A page fault the kernel cannot resolve. Fatal to the application.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FaultError {
    /// Protection fault on a present page that is not copy-on-write.
    #[error("page at {0} is already mapped")]
    AlreadyAllocated(VirtualAddress),
    /// Fault outside the image, the demand-paging window and every file map.
    #[error("{0} is outside every mapped region")]
    IndexOutOfRange(VirtualAddress),
    #[error(transparent)]
    Memory(#[from] VmemError),
    #[error(transparent)]
    File(#[from] FdError),
}
