//! Context switches and the user-mode round trip.

use core::arch::naked_asm;
use core::mem::offset_of;
use kernel_process::AppCall;
use kernel_task::TaskContext;

/// Save the caller's registers into `current`, then resume `next` through
/// `iretq`.
///
/// The saved context resumes right after the call, with the flags the
/// caller had. Scratch registers are saved too, so a context built by
/// `Task::init_context` receives its arguments.
///
/// # Safety
/// See [`TaskCpu::switch_context`](kernel_task::TaskCpu::switch_context).
#[unsafe(naked)]
pub unsafe extern "sysv64" fn switch_context(next: *const TaskContext, current: *mut TaskContext) {
    naked_asm!(
        "mov [rsi + {rax}], rax",
        "mov [rsi + {rbx}], rbx",
        "mov [rsi + {rcx}], rcx",
        "mov [rsi + {rdx}], rdx",
        "mov [rsi + {rdi}], rdi",
        "mov [rsi + {rsi}], rsi",
        "mov [rsi + {rbp}], rbp",
        "mov [rsi + {r8}], r8",
        "mov [rsi + {r9}], r9",
        "mov [rsi + {r10}], r10",
        "mov [rsi + {r11}], r11",
        "mov [rsi + {r12}], r12",
        "mov [rsi + {r13}], r13",
        "mov [rsi + {r14}], r14",
        "mov [rsi + {r15}], r15",
        // Resume at the return address with the stack as after `ret`.
        "mov rax, [rsp]",
        "mov [rsi + {rip}], rax",
        "lea rax, [rsp + 8]",
        "mov [rsi + {rsp}], rax",
        "mov rax, cr3",
        "mov [rsi + {cr3}], rax",
        "pushfq",
        "pop qword ptr [rsi + {rflags}]",
        "xor eax, eax",
        "mov ax, cs",
        "mov [rsi + {cs}], rax",
        "mov ax, ss",
        "mov [rsi + {ss}], rax",
        "mov ax, fs",
        "mov [rsi + {fs}], rax",
        "mov ax, gs",
        "mov [rsi + {gs}], rax",
        "fxsave64 [rsi + {fx}]",

        "push qword ptr [rdi + {ss}]",
        "push qword ptr [rdi + {rsp}]",
        "push qword ptr [rdi + {rflags}]",
        "push qword ptr [rdi + {cs}]",
        "push qword ptr [rdi + {rip}]",
        "fxrstor64 [rdi + {fx}]",
        "mov rax, [rdi + {cr3}]",
        "mov cr3, rax",
        "mov rax, [rdi + {fs}]",
        "mov fs, ax",
        "mov rax, [rdi + {gs}]",
        "mov gs, ax",
        "mov rax, [rdi + {rax}]",
        "mov rbx, [rdi + {rbx}]",
        "mov rcx, [rdi + {rcx}]",
        "mov rdx, [rdi + {rdx}]",
        "mov rsi, [rdi + {rsi}]",
        "mov rbp, [rdi + {rbp}]",
        "mov r8, [rdi + {r8}]",
        "mov r9, [rdi + {r9}]",
        "mov r10, [rdi + {r10}]",
        "mov r11, [rdi + {r11}]",
        "mov r12, [rdi + {r12}]",
        "mov r13, [rdi + {r13}]",
        "mov r14, [rdi + {r14}]",
        "mov r15, [rdi + {r15}]",
        "mov rdi, [rdi + {rdi}]",
        "iretq",
        cr3 = const offset_of!(TaskContext, cr3),
        rip = const offset_of!(TaskContext, rip),
        rflags = const offset_of!(TaskContext, rflags),
        cs = const offset_of!(TaskContext, cs),
        ss = const offset_of!(TaskContext, ss),
        fs = const offset_of!(TaskContext, fs),
        gs = const offset_of!(TaskContext, gs),
        rax = const offset_of!(TaskContext, rax),
        rbx = const offset_of!(TaskContext, rbx),
        rcx = const offset_of!(TaskContext, rcx),
        rdx = const offset_of!(TaskContext, rdx),
        rdi = const offset_of!(TaskContext, rdi),
        rsi = const offset_of!(TaskContext, rsi),
        rsp = const offset_of!(TaskContext, rsp),
        rbp = const offset_of!(TaskContext, rbp),
        r8 = const offset_of!(TaskContext, r8),
        r9 = const offset_of!(TaskContext, r9),
        r10 = const offset_of!(TaskContext, r10),
        r11 = const offset_of!(TaskContext, r11),
        r12 = const offset_of!(TaskContext, r12),
        r13 = const offset_of!(TaskContext, r13),
        r14 = const offset_of!(TaskContext, r14),
        r15 = const offset_of!(TaskContext, r15),
        fx = const offset_of!(TaskContext, fxsave_area),
    );
}

/// Enter the application described by `call` in ring 3. Returns the exit
/// code passed to [`exit_app`].
///
/// The callee-saved registers and the flags are pushed on the kernel stack,
/// and the resulting stack pointer is stored in `*call.os_stack_pointer`.
/// The application starts with `argc` in `RDI`, `argv` in `RSI` and
/// interrupts enabled.
///
/// # Safety
/// See [`LaunchHost::call_app`](kernel_process::LaunchHost::call_app).
#[unsafe(naked)]
pub unsafe extern "sysv64" fn call_app(call: *const AppCall) -> i32 {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "pushfq",
        "mov rax, [rdi + {osp}]",
        "mov [rax], rsp",

        "movzx eax, word ptr [rdi + {ss}]",
        "push rax",
        "push qword ptr [rdi + {rsp}]",
        "pushfq",
        "or qword ptr [rsp], 0x200",
        "movzx eax, word ptr [rdi + {cs}]",
        "push rax",
        "push qword ptr [rdi + {entry}]",
        "mov rsi, [rdi + {argv}]",
        "mov rdi, [rdi + {argc}]",
        "xor eax, eax",
        "xor ebx, ebx",
        "xor ecx, ecx",
        "xor edx, edx",
        "xor ebp, ebp",
        "xor r8d, r8d",
        "xor r9d, r9d",
        "xor r10d, r10d",
        "xor r11d, r11d",
        "xor r12d, r12d",
        "xor r13d, r13d",
        "xor r14d, r14d",
        "xor r15d, r15d",
        "iretq",
        osp = const offset_of!(AppCall, os_stack_pointer),
        ss = const offset_of!(AppCall, ss),
        rsp = const offset_of!(AppCall, rsp),
        cs = const offset_of!(AppCall, cs),
        entry = const offset_of!(AppCall, entry),
        argv = const offset_of!(AppCall, argv),
        argc = const offset_of!(AppCall, argc),
    );
}

/// Leave the running application: return `code` from the [`call_app`]
/// that saved `os_stack_pointer`.
///
/// # Safety
/// `os_stack_pointer` must be the value [`call_app`] stored for the running
/// application, and that call must not have returned yet.
#[unsafe(naked)]
pub unsafe extern "sysv64" fn exit_app(os_stack_pointer: u64, code: i32) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "mov eax, esi",
        "popfq",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}
