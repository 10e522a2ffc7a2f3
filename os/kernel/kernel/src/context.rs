//! The kernel's mutable state, owned in one place.

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_process::fault::{PageFaultError, handle_page_fault};
use kernel_process::{AppLoadCache, FaultError, ProcessCtx, RootSwitch};
use kernel_registers::rflags::Rflags;
use kernel_task::{Message, TaskCpu, TaskConfig, TaskError, TaskId, TaskManager, Timer, TimerManager};
use kernel_vmem::{FrameAlloc, PhysMapper, RootPage};
use log::{debug, info, warn};

/// Scheduler, timers, frames and loaded images of the running kernel.
///
/// Built once at boot. Every method expects to run with interrupts masked,
/// i.e. through `SpinLock::lock_irq`.
pub struct KernelContext<M, A, C: TaskCpu> {
    pub mapper: M,
    pub frames: A,
    pub tasks: TaskManager<C>,
    pub timers: TimerManager,
    pub cache: AppLoadCache,
    /// Root table active whenever no application is loaded.
    pub kernel_root: RootPage,
    /// Root-table switching for the process layer. The task manager keeps
    /// its own handle to the same CPU.
    pub cpu: C,
}

impl<M, A, C> KernelContext<M, A, C>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: TaskCpu + RootSwitch + Clone,
{
    /// Take over the running flow as the main task. The active root table
    /// becomes the kernel root.
    pub fn new(mapper: M, frames: A, cpu: C, config: TaskConfig) -> Self {
        let kernel_root = RootPage::containing_address(PhysicalAddress::new(cpu.read_cr3()));
        let usage = frames.usage();
        info!(
            "kernel context: root {:?}, {}/{} frames in use",
            kernel_root.base(),
            usage.allocated,
            usage.total
        );
        Self {
            mapper,
            frames,
            tasks: TaskManager::new(cpu.clone(), config),
            timers: TimerManager::new(),
            cache: AppLoadCache::new(),
            kernel_root,
            cpu,
        }
    }

    /// Run `f` on the process state of the running task.
    pub fn with_process<R>(&mut self, f: impl FnOnce(&mut ProcessCtx<'_, M, A, C>) -> R) -> R {
        let mut ctx = ProcessCtx {
            mapper: &self.mapper,
            frames: &mut self.frames,
            cache: &mut self.cache,
            task: self.tasks.current_task_mut(),
            kernel_root: self.kernel_root,
            cpu: &mut self.cpu,
        };
        f(&mut ctx)
    }

    /// Create a ready task that starts in `trampoline(argument, id, function)`.
    ///
    /// The trampoline runs while the switching task still holds the kernel
    /// lock. It starts with interrupts masked, has to release the lock and
    /// enable them itself.
    pub fn spawn(&mut self, trampoline: VirtualAddress, function: u64, argument: u64) -> TaskId {
        let id = self.tasks.spawn(trampoline, argument);
        if let Ok(task) = self.tasks.task_mut(id) {
            let ctx = task.context_mut();
            ctx.rdx = function;
            ctx.rflags = Rflags::from_bits(ctx.rflags)
                .with_if_interrupt_enable(false)
                .into_bits();
        }
        id
    }

    /// Arm a one-shot timer for the running task, `ticks` from now, and
    /// return its deadline. `None` if the deadline does not fit the tick
    /// counter; nothing is armed then.
    pub fn add_timer(&mut self, ticks: u64, value: i32) -> Option<u64> {
        let Some(timeout) = self.timers.current_tick().checked_add(ticks) else {
            warn!("timer {value}: {ticks} ticks from now is past the end of time");
            return None;
        };
        let owner = self.tasks.current_id();
        self.timers.add_timer(Timer::new(timeout, value, owner));
        debug!("timer {value} for {owner:?} due at {timeout}");
        Some(timeout)
    }

    /// Timer interrupt: advance the clock, deliver expired timers and
    /// preempt the running task when its slice is over.
    pub fn on_timer_tick(&mut self) {
        let tasks = &mut self.tasks;
        let preempt = self.timers.tick(|id, msg| {
            if let Err(e) = tasks.send_message(id, msg).and_then(|()| tasks.wakeup(id)) {
                warn!("timer for {id:?} dropped: {e}");
            }
        });
        if preempt {
            self.tasks.switch_task(false);
        }
    }

    /// Page fault in the running task's address space.
    ///
    /// # Errors
    /// See [`handle_page_fault`]; the application has to be terminated.
    pub fn on_page_fault(
        &mut self,
        error: PageFaultError,
        address: VirtualAddress,
    ) -> Result<(), FaultError> {
        self.with_process(|ctx| handle_page_fault(ctx, error, address))
    }

    /// Next message of the running task, sleeping until one arrives.
    ///
    /// # Errors
    /// [`TaskError::LastReadyTask`] if nothing else could run meanwhile.
    pub fn receive(&mut self) -> Result<Message, TaskError> {
        let id = self.tasks.current_id();
        self.tasks.receive_or_sleep(id)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::kernel;
    use super::*;
    use kernel_info::task::TASK_TIMER_PERIOD;
    use kernel_process::fault::demand_pages;
    use kernel_vmem::AddressSpace;

    #[test]
    fn boot_root_becomes_the_kernel_root() {
        let k = kernel();
        assert_eq!(k.kernel_root.base(), PhysicalAddress::new(k.cpu.read_cr3()));
        assert_eq!(k.tasks.current_id(), TaskId::MAIN);
        assert_eq!(k.tasks.current_task().context().cr3, k.cpu.read_cr3());
    }

    #[test]
    fn spawned_tasks_enter_through_the_trampoline() {
        let mut k = kernel();
        let id = k.spawn(VirtualAddress::new(0x1000), 0x2000, 7);
        let ctx = k.tasks.task(id).unwrap().context();
        assert_eq!(ctx.rip, 0x1000);
        assert_eq!(ctx.rdi, 7);
        assert_eq!(ctx.rsi, id.as_u64());
        assert_eq!(ctx.rdx, 0x2000);
        assert_eq!(ctx.rflags, 0x2);
    }

    #[test]
    fn the_task_timer_preempts() {
        let mut k = kernel();
        k.timers.start_task_timer();
        let worker = k.spawn(VirtualAddress::new(0x1000), 0, 0);

        for _ in 1..TASK_TIMER_PERIOD {
            k.on_timer_tick();
        }
        assert_eq!(k.tasks.current_id(), TaskId::MAIN);
        k.on_timer_tick();
        assert_eq!(k.tasks.current_id(), worker);
        assert_eq!(*k.cpu.switched_to.lock().unwrap(), [worker.as_u64()]);
    }

    #[test]
    fn expired_timers_wake_their_task() {
        let mut k = kernel();
        let worker = k.spawn(VirtualAddress::new(0x1000), 0, 0);
        k.tasks.sleep(worker).unwrap();
        k.timers.add_timer(Timer::new(2, 5, worker));

        k.on_timer_tick();
        assert!(!k.tasks.task(worker).unwrap().is_running());
        k.on_timer_tick();

        let task = k.tasks.task(worker).unwrap();
        assert!(task.is_running());
        assert_eq!(task.pending_messages(), 1);
        assert!(k.tasks.ready_ids().any(|id| id == worker));
    }

    #[test]
    fn own_timers_come_back_as_messages() {
        let mut k = kernel();
        assert_eq!(k.add_timer(1, 9), Some(1));
        k.on_timer_tick();
        assert_eq!(k.receive(), Ok(Message::TimerTimeout { timeout: 1, value: 9 }));
    }

    #[test]
    fn timers_past_the_end_of_the_clock_are_refused() {
        let mut k = kernel();
        k.on_timer_tick();
        assert_eq!(k.add_timer(u64::MAX, 1), None);
        assert_eq!(k.timers.pending(), 0);
        assert_eq!(k.add_timer(u64::MAX - 1, 2), Some(u64::MAX));
        assert_eq!(k.timers.pending(), 1);
    }

    #[test]
    fn receive_without_messages_or_other_tasks_fails() {
        let mut k = kernel();
        assert_eq!(k.receive(), Err(TaskError::LastReadyTask(TaskId::MAIN)));
    }

    #[test]
    fn page_faults_reach_the_running_task() {
        let mut k = kernel();
        let heap = VirtualAddress::new(0xFFFF_8000_0010_0000);
        k.with_process(|ctx| {
            let space = AddressSpace::create(ctx.mapper, ctx.frames, ctx.kernel_root).unwrap();
            ctx.install_root(space.root_page());
            let process = ctx.task.process_mut();
            process.dpaging_begin = heap;
            process.dpaging_end = heap;
            process.file_map_end = heap + 0x10_0000;
            demand_pages(ctx.task, 1).unwrap();
        });

        let user_write = PageFaultError::new().with_user(true).with_write(true);
        assert_eq!(k.on_page_fault(user_write, heap + 0x10), Ok(()));
        let outside = heap + 0x1000;
        assert_eq!(
            k.on_page_fault(user_write, outside),
            Err(FaultError::IndexOutOfRange(outside))
        );
        let mapped = k.with_process(|ctx| ctx.address_space().translate(heap).is_some());
        assert!(mapped);
    }
}
