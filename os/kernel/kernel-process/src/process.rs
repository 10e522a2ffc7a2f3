//! The state a process operation works on.

use crate::cache::AppLoadCache;
use kernel_memory_addresses::PhysicalAddress;
use kernel_task::Task;
use kernel_vmem::{AddressSpace, FrameAlloc, PhysMapper, RootPage};
use log::trace;

/// Switching the hardware's active root table.
pub trait RootSwitch {
    /// Make `root` the active root table.
    ///
    /// # Safety
    /// `root` must map the kernel half exactly like the running root does.
    unsafe fn write_cr3(&mut self, root: RootPage);
}

/// Borrowed view of the kernel state needed to load, run and fault in an
/// application on behalf of `task`.
///
/// The kernel builds one per critical section from its singleton, with
/// interrupts masked for the whole lifetime of the value.
pub struct ProcessCtx<'a, M: PhysMapper, A: FrameAlloc, C: RootSwitch> {
    pub mapper: &'a M,
    pub frames: &'a mut A,
    pub cache: &'a mut AppLoadCache,
    /// The task the application runs in; normally the running task.
    pub task: &'a mut Task,
    /// Root table of the kernel, active whenever no application is loaded.
    pub kernel_root: RootPage,
    pub cpu: &'a mut C,
}

impl<'a, M: PhysMapper, A: FrameAlloc, C: RootSwitch> ProcessCtx<'a, M, A, C> {
    /// The root table recorded in the task's context.
    #[must_use]
    pub fn task_root(&self) -> RootPage {
        RootPage::containing_address(PhysicalAddress::new(self.task.context().cr3))
    }

    /// The address space the task runs in.
    #[must_use]
    pub fn address_space(&self) -> AddressSpace<'a, M> {
        AddressSpace::from_root(self.mapper, self.task_root())
    }

    /// Record `root` in the task's context and activate it.
    pub fn install_root(&mut self, root: RootPage) {
        trace!("{:?} cr3 <- {:?}", self.task.id(), root.base());
        self.task.context_mut().cr3 = root.base().as_u64();
        // SAFETY: every root handed out by this crate is either the kernel
        // root or was created from it by `AddressSpace::create`.
        unsafe { self.cpu.write_cr3(root) };
    }

    /// `true` while the task runs in an address space of its own.
    #[must_use]
    pub fn has_app_root(&self) -> bool {
        self.task_root() != self.kernel_root
    }
}
