//! # x86-64 glue
//!
//! The pieces that only make sense on the real machine:
//!
//! - [`X86Cpu`]: root-table loads, context switches and user-mode entry
//!   for the task and process layers.
//! - The kernel singleton behind [`kernel`], built once by [`init`].
//! - [`spawn`] and the task trampoline new tasks start in.
//! - [`interrupts`]: timer and page-fault entry points. Installing them in
//!   the IDT and programming the local APIC is up to the platform code.

pub mod interrupts;
mod switch;

use crate::boot::BootInfo;
use crate::{EnterUser, KernelContext};
use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::phys_mapper::HhdmPhysMapper;
use kernel_memory_addresses::VirtualAddress;
use kernel_process::{AppCall, RootSwitch};
use kernel_registers::cr3::Cr3;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use kernel_sync::{SpinLock, SyncOnceCell};
use kernel_task::{TaskConfig, TaskContext, TaskCpu, TaskId};
use kernel_vmem::RootPage;
use log::{info, warn};

pub use switch::exit_app;

/// Words in the frame bitmap; enough for 512 MiB of physical memory.
const FRAME_BITMAP_WORDS: usize = 2048;

pub type Frames = BitmapFrameAlloc<FRAME_BITMAP_WORDS>;
pub type Kernel = KernelContext<HhdmPhysMapper, Frames, X86Cpu>;

static KERNEL: SyncOnceCell<SpinLock<Kernel>> = SyncOnceCell::new();

/// The processor the kernel runs on.
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Cpu;

impl TaskCpu for X86Cpu {
    fn read_cr3(&self) -> u64 {
        // SAFETY: reading CR3 has no side effects.
        unsafe { Cr3::load_unsafe() }.root().as_u64()
    }

    unsafe fn switch_context(&mut self, next: *const TaskContext, current: *mut TaskContext) {
        // SAFETY: forwarded from the caller.
        unsafe { switch::switch_context(next, current) }
    }
}

impl RootSwitch for X86Cpu {
    unsafe fn write_cr3(&mut self, root: RootPage) {
        // SAFETY: forwarded from the caller.
        unsafe { Cr3::from_root(root.base()).store_unsafe() }
    }
}

impl EnterUser for X86Cpu {
    unsafe fn call_app(&mut self, call: &AppCall) -> i32 {
        // SAFETY: forwarded from the caller.
        unsafe { switch::call_app(call) }
    }
}

/// The kernel singleton, once [`init`] has run.
pub fn kernel() -> Option<&'static SpinLock<Kernel>> {
    KERNEL.get()
}

/// Build the kernel singleton from the boot information and start the
/// task timer. The running flow becomes the main task.
///
/// Calling it again returns the existing instance.
pub fn init(boot: &BootInfo) -> &'static SpinLock<Kernel> {
    let kernel = KERNEL.get_or_init(|| {
        let (begin, end) = boot.usable_frames();
        let mut frames = Frames::new();
        frames.set_range(begin, end);
        let mut kernel = KernelContext::new(HhdmPhysMapper, frames, X86Cpu, TaskConfig::default());
        kernel.timers.start_task_timer();
        SpinLock::new(kernel)
    });
    info!("frames {:?}", boot.usable_frames());
    kernel
}

/// Start `function(argument, id)` in a new kernel task.
///
/// When `function` returns, the task goes to sleep for good.
///
/// # Panics
/// If called before [`init`].
pub fn spawn(function: extern "sysv64" fn(u64, TaskId), argument: u64) -> TaskId {
    let Some(kernel) = kernel() else {
        panic!("spawn before kernel init");
    };
    let trampoline = VirtualAddress::new(task_trampoline as usize as u64);
    kernel
        .lock_irq()
        .spawn(trampoline, function as usize as u64, argument)
}

/// First code a spawned task runs. The task that switched here still holds
/// the kernel lock with interrupts masked.
extern "sysv64" fn task_trampoline(
    argument: u64,
    task_id: u64,
    function: extern "sysv64" fn(u64, TaskId),
) -> ! {
    let Some(kernel) = kernel() else {
        halt();
    };
    // SAFETY: the lock was taken by the task that switched to this one and
    // is released on its behalf.
    unsafe { kernel.force_unlock() };
    // SAFETY: the lock is free again.
    unsafe { core::arch::asm!("sti", options(nomem, nostack)) };

    let id = TaskId::new(task_id);
    function(argument, id);

    info!("{id:?} finished");
    loop {
        let mut kernel = kernel.lock_irq();
        if let Err(e) = kernel.tasks.sleep(id) {
            warn!("{id:?} cannot sleep: {e}");
            drop(kernel);
            wait_for_interrupt();
        }
    }
}

/// Idle until the next interrupt.
pub fn wait_for_interrupt() {
    // SAFETY: `hlt` only waits.
    unsafe { core::arch::asm!("hlt", options(nomem, nostack, preserves_flags)) };
}

/// Stop this CPU for good.
pub fn halt() -> ! {
    loop {
        // SAFETY: interrupts stay masked; `hlt` never returns.
        unsafe { core::arch::asm!("cli; hlt", options(nomem, nostack)) };
    }
}
