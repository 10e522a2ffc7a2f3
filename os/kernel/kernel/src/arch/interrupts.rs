//! Interrupt entry points.
//!
//! Both handlers expect an interrupt gate, i.e. interrupts masked on entry,
//! and a kernel code selector. Only the scratch registers are saved; the
//! Rust handlers preserve the rest.

use super::{exit_app, halt, kernel};
use core::arch::naked_asm;
use kernel_memory_addresses::VirtualAddress;
use kernel_process::fault::PageFaultError;
use log::{error, warn};

/// Vector of the periodic local APIC timer.
pub const TIMER_VECTOR: u8 = 0xE0;

/// Vector of `#PF`.
pub const PAGE_FAULT_VECTOR: u8 = 0x0E;

/// Exit code of an application killed by a page fault.
pub const FAULT_EXIT_CODE: i32 = -1;

const IA32_X2APIC_EOI: u32 = 0x80B;

/// Timer interrupt entry.
///
/// The CPU pushes five words after aligning the stack to 16 bytes; nine
/// pushes later the stack is aligned for the call again.
#[unsafe(naked)]
pub extern "sysv64" fn timer_interrupt_entry() {
    naked_asm!(
        "cld",
        "push rax", "push rcx", "push rdx", "push rsi", "push rdi",
        "push r8", "push r9", "push r10", "push r11",
        "call {handler}",
        "pop r11", "pop r10", "pop r9", "pop r8",
        "pop rdi", "pop rsi", "pop rdx", "pop rcx", "pop rax",
        "iretq",
        handler = sym on_timer,
    )
}

/// Page-fault entry. The error code the CPU pushed is passed on and
/// dropped before returning.
#[unsafe(naked)]
pub extern "sysv64" fn page_fault_entry() {
    naked_asm!(
        "cld",
        "push rax", "push rcx", "push rdx", "push rsi", "push rdi",
        "push r8", "push r9", "push r10", "push r11",
        "mov rdi, [rsp + 72]",
        "mov rsi, cr2",
        "sub rsp, 8",
        "call {handler}",
        "add rsp, 8",
        "pop r11", "pop r10", "pop r9", "pop r8",
        "pop rdi", "pop rsi", "pop rdx", "pop rcx", "pop rax",
        "add rsp, 8",
        "iretq",
        handler = sym on_page_fault,
    )
}

extern "sysv64" fn on_timer() {
    end_of_interrupt();
    if let Some(kernel) = kernel() {
        kernel.lock_irq().on_timer_tick();
    }
}

extern "sysv64" fn on_page_fault(error: u64, address: u64) {
    let error = PageFaultError::from_bits(error);
    let address = VirtualAddress::new(address);
    let Some(kernel) = kernel() else {
        error!("page fault at {address} before init: {}", error.explain());
        halt();
    };

    let result = kernel.lock_irq().on_page_fault(error, address);
    let Err(e) = result else {
        return;
    };
    if !error.user() {
        error!("kernel page fault at {address}: {e} ({})", error.explain());
        halt();
    }

    warn!("application killed: {e}");
    let os_stack_pointer = kernel.lock_irq().tasks.current_task().process().os_stack_pointer;
    // SAFETY: a user-mode fault means the running task is inside `call_app`,
    // which saved this stack pointer.
    unsafe { exit_app(os_stack_pointer, FAULT_EXIT_CODE) }
}

/// Acknowledge the interrupt being serviced at the local APIC (x2APIC mode).
fn end_of_interrupt() {
    // SAFETY: writing the EOI register has no effect besides the
    // acknowledgement.
    unsafe {
        core::arch::asm!(
            "wrmsr",
            in("ecx") IA32_X2APIC_EOI,
            in("eax") 0u32,
            in("edx") 0u32,
            options(nostack, preserves_flags),
        );
    }
}
