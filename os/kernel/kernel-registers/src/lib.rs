//! # Typed `X86_64` Registers
//!
//! Only the registers the task layer touches: `CR3` (address-space root,
//! saved per task and reloaded on every switch) and `RFLAGS` (interrupt
//! flag, initial task flags).
//!
//! Reading or writing either register is privileged, so loads and stores go
//! through [`LoadRegisterUnsafe`] / [`StoreRegisterUnsafe`]. The `asm` feature
//! provides the real instructions; without it the types remain usable as
//! plain bitfields (e.g., when building a task context on the host).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "rflags")]
pub mod rflags;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing `CR3` switches the active address space; the new root must map
    /// the currently executing code and stack.
    unsafe fn store_unsafe(self);
}
