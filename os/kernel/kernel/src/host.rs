//! Launching applications from kernel tasks.

use crate::KernelContext;
use kernel_process::{AppCall, LaunchHost, ProcessCtx, RootSwitch};
use kernel_sync::SpinLock;
use kernel_task::TaskCpu;
use kernel_vmem::{FrameAlloc, PhysMapper};

/// Entering user mode.
pub trait EnterUser {
    /// Jump to `call.entry` in ring 3 and return the exit code once the
    /// application exits.
    ///
    /// # Safety
    /// See [`LaunchHost::call_app`].
    unsafe fn call_app(&mut self, call: &AppCall) -> i32;
}

/// [`LaunchHost`] over the locked kernel singleton.
///
/// Each critical section of a launch takes the lock with interrupts masked;
/// the application runs with neither.
pub struct KernelHost<'k, M, A, C: TaskCpu> {
    kernel: &'k SpinLock<KernelContext<M, A, C>>,
    cpu: C,
}

impl<'k, M, A, C> KernelHost<'k, M, A, C>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: TaskCpu + RootSwitch + EnterUser + Clone,
{
    pub const fn new(kernel: &'k SpinLock<KernelContext<M, A, C>>, cpu: C) -> Self {
        Self { kernel, cpu }
    }
}

impl<M, A, C> LaunchHost for KernelHost<'_, M, A, C>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: TaskCpu + RootSwitch + EnterUser + Clone,
{
    type Mapper = M;
    type Frames = A;
    type Cpu = C;

    fn with_process<R>(&mut self, f: impl FnOnce(&mut ProcessCtx<'_, M, A, C>) -> R) -> R {
        self.kernel.lock_irq().with_process(f)
    }

    unsafe fn call_app(&mut self, call: &AppCall) -> i32 {
        // SAFETY: forwarded from the caller.
        unsafe { self.cpu.call_app(call) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{FakeCpu, kernel};
    use kernel_memory_addresses::VirtualAddress;
    use kernel_sync::interrupts_enabled;

    impl EnterUser for FakeCpu {
        unsafe fn call_app(&mut self, call: &AppCall) -> i32 {
            assert!(interrupts_enabled(), "applications run with interrupts on");
            i32::try_from(call.argc).unwrap()
        }
    }

    fn call() -> AppCall {
        AppCall {
            argc: 2,
            argv: VirtualAddress::new(0xFFFF_FFFF_FFFF_F000),
            cs: 0x23,
            ss: 0x1B,
            entry: VirtualAddress::new(0xFFFF_8000_0000_0000),
            rsp: VirtualAddress::new(0xFFFF_FFFF_FFFF_EFF8),
            os_stack_pointer: core::ptr::null_mut(),
        }
    }

    #[test]
    fn critical_sections_mask_interrupts() {
        let k = kernel();
        let cpu = k.cpu.clone();
        let lock = SpinLock::new(k);
        let mut host = KernelHost::new(&lock, cpu);

        let root = host.with_process(|ctx| {
            assert!(!interrupts_enabled());
            assert!(!ctx.has_app_root());
            ctx.kernel_root
        });
        assert!(interrupts_enabled());
        assert_eq!(root, lock.lock().kernel_root);
    }

    #[test]
    fn the_app_runs_outside_the_lock() {
        let k = kernel();
        let cpu = k.cpu.clone();
        let lock = SpinLock::new(k);
        let mut host = KernelHost::new(&lock, cpu);

        // SAFETY: the fake CPU does not enter user mode.
        let ret = unsafe { host.call_app(&call()) };
        assert_eq!(ret, 2);
        assert!(lock.try_lock().is_some());
    }
}
