//! # Task Configuration

/// Default kernel stack size of a task, in bytes.
pub const TASK_STACK_BYTES: usize = 4096;

/// Kernel code segment selector.
pub const KERNEL_CS: u16 = 1 << 3;

/// Kernel stack segment selector.
pub const KERNEL_SS: u16 = 2 << 3;

/// User stack segment selector, without RPL bits.
pub const USER_SS: u16 = 3 << 3;

/// User code segment selector, without RPL bits.
///
/// Placed right after [`USER_SS`] so `SYSRET`-style entry can derive it.
pub const USER_CS: u16 = 4 << 3;

/// Requested privilege level for user-mode selectors.
pub const USER_RPL: u16 = 3;

/// Initial `RFLAGS` of a fresh task: IF set, reserved bit 1 set.
pub const INITIAL_RFLAGS: u64 = 0x202;

/// Initial `MXCSR`: all SIMD floating-point exceptions masked.
pub const INITIAL_MXCSR: u32 = 0x1F80;

/// Byte offset of `MXCSR` inside an FXSAVE image.
pub const FXSAVE_MXCSR_OFFSET: usize = 24;

/// Timer frequency in ticks per second.
pub const TIMER_FREQ: u64 = 100;

/// Ticks between two preemptive task switches.
pub const TASK_TIMER_PERIOD: u64 = TIMER_FREQ / 50;

/// Sentinel value carried by the task-switch timer.
pub const TASK_TIMER_VALUE: i32 = i32::MIN;

/// ID of the task representing the boot flow.
pub const MAIN_TASK_ID: u64 = 1;

const _: () = {
    assert!(TASK_STACK_BYTES.is_multiple_of(16));
    assert!(USER_CS == USER_SS + 8);
    assert!(TASK_TIMER_PERIOD > 0);
    assert!(FXSAVE_MXCSR_OFFSET + 4 <= 512);
};
