//! # Kernel Layout and Task Configuration
//!
//! Compile-time constants shared by the paging, scheduler and launch crates.
//! Everything here is `const` and checked with `const _: () = assert!(..)`
//! blocks, so an inconsistent layout fails the build instead of faulting at
//! runtime.
//!
//! ## Virtual Address Space Layout
//!
//! Every task owns a four-level page table. The **lower** half of its root
//! table is shared with the kernel; the **upper** half belongs to the user
//! application currently executing in that task.
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │   Kernel half (PML4 0..256)     │
//!                       │   identity-mapped RAM, kernel   │
//!                       │   image, kernel task stacks     │
//! 0x0000_7FFF_FFFF_FFFF ├─────────────────────────────────┤
//!                       │   non-canonical hole            │
//! 0xFFFF_8000_0000_0000 ├─────────────────────────────────┤ APP_REGION_START
//!                       │   ELF PT_LOAD segments          │
//!                       │   demand-paged heap  ↓          │
//!                       │                                 │
//!                       │   memory-mapped files ↑         │
//!                       │   user stack (8 pages)          │
//! 0xFFFF_FFFF_FFFF_F000 ├─────────────────────────────────┤ ARGS_FRAME
//!                       │   argv[32] + argument strings   │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! * [`memory`]: page-table split, application region, argument frame, user stack.
//! * [`task`]: task stack size, segment selectors, initial register values, timer cadence.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod task;
