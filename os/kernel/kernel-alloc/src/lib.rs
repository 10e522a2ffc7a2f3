//! # Kernel Memory Allocation
//!
//! Physical frame allocation, the physical mapper and the kernel heap.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        kernel-vmem (AddressSpace, page tables)      │
//! └───────────┬─────────────────────────┬───────────────┘
//!             │ FrameAlloc              │ PhysMapper
//! ┌───────────▼─────────────┐ ┌─────────▼───────────────┐
//! │   BitmapFrameAlloc      │ │   HhdmPhysMapper        │
//! │   one bit per 4 KiB     │ │   PHYS_MAP_BASE + pa    │
//! └─────────────────────────┘ └─────────────────────────┘
//! ┌─────────────────────────────────────────────────────┐
//! │   KernelHeap (GlobalAlloc over a static free list)  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`frame_alloc::BitmapFrameAlloc`]: implements [`kernel_vmem::FrameAlloc`].
//!   Frames are tracked by absolute frame number; boot code reserves what the
//!   firmware memory map marks unusable and then sets the managed range.
//! - [`phys_mapper::HhdmPhysMapper`]: implements [`kernel_vmem::PhysMapper`]
//!   over the kernel's direct map of physical memory.
//! - [`KernelHeap`]: a first-fit, coalescing free-list allocator over a
//!   statically reserved region, guarded by an interrupt-masking spin lock.
//!
//! None of these types are synchronised on their own except the heap; the
//! frame allocator lives inside the kernel context and is reached under its
//! lock.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
pub mod free_list;
pub mod phys_mapper;
mod static_heap;

pub use static_heap::KernelHeap;
