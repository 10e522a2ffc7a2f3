//! # Task Manager
//!
//! Owns every task and the ready queue. The front of the queue is the task
//! whose code is executing.
//!
//! ```text
//!            new_task
//!               │
//!               ▼        wakeup          front + switch
//!          ┌─────────┐ ─────────► ┌───────┐ ──────────► ┌─────────┐
//!          │Sleeping │            │ Ready │             │ Running │
//!          └─────────┘ ◄───────── └───────┘ ◄────────── └─────────┘
//!               ▲        sleep          switch_task(false)  │
//!               └───────────────────────────────────────────┘
//!                          sleep / switch_task(true)
//! ```
//!
//! The manager is not synchronised by itself. The kernel keeps it behind an
//! interrupt-masking lock, which is held across [`switch_task`]; a task that
//! runs for the first time must release that lock before doing anything else.
//!
//! [`switch_task`]: TaskManager::switch_task

use crate::context::TaskContext;
use crate::message::Message;
use crate::task::{Task, TaskConfig, TaskId};
use crate::TaskError;
use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use kernel_memory_addresses::VirtualAddress;
use log::{debug, info, trace, warn};

/// The CPU primitives the scheduler needs.
///
/// Implemented with inline assembly by the kernel and by recording fakes in
/// tests.
pub trait TaskCpu {
    /// Physical address of the active root table.
    fn read_cr3(&self) -> u64;

    /// Save the running registers into `current` and resume from `next`.
    ///
    /// Returns when some later switch resumes `current`.
    ///
    /// # Safety
    /// - Both pointers must be valid for the duration of the switch.
    /// - `next` must hold a context prepared by
    ///   [`Task::init_context`](crate::Task::init_context) or saved by a
    ///   previous switch.
    /// - Interrupts must be masked.
    unsafe fn switch_context(&mut self, next: *const TaskContext, current: *mut TaskContext);
}

/// Owner of all tasks and the ready queue.
pub struct TaskManager<C: TaskCpu> {
    tasks: BTreeMap<TaskId, Box<Task>>,
    ready: VecDeque<TaskId>,
    latest_id: u64,
    config: TaskConfig,
    cpu: C,
}

impl<C: TaskCpu> TaskManager<C> {
    /// Create the manager and register the running boot flow as
    /// [`TaskId::MAIN`], the only ready task.
    pub fn new(cpu: C, config: TaskConfig) -> Self {
        let mut this = Self {
            tasks: BTreeMap::new(),
            ready: VecDeque::new(),
            latest_id: 0,
            config,
            cpu,
        };
        let cr3 = this.cpu.read_cr3();
        let main = this.new_task();
        main.context_mut().cr3 = cr3;
        main.wakeup();
        let id = main.id();
        debug_assert_eq!(id, TaskId::MAIN);
        this.ready.push_back(id);
        this
    }

    /// Create a sleeping task with a fresh stack.
    ///
    /// The task is not scheduled until its context is initialised and it is
    /// woken up.
    pub fn new_task(&mut self) -> &mut Task {
        self.latest_id += 1;
        let id = TaskId::new(self.latest_id);
        trace!("new task {id:?}");
        self.tasks
            .entry(id)
            .or_insert_with(|| Box::new(Task::new(id, &self.config)))
    }

    /// Create a task that calls `entry(argument, id)`, and make it ready.
    pub fn spawn(&mut self, entry: VirtualAddress, argument: u64) -> TaskId {
        let cr3 = self.cpu.read_cr3();
        let task = self.new_task();
        task.init_context(entry, argument, cr3);
        let id = task.id();
        self.wake(id);
        info!("spawned {id:?} at {entry}");
        id
    }

    /// Rotate the ready queue and switch to its new front.
    ///
    /// With `sleep_current` the running task leaves the queue (it must already
    /// be marked sleeping); otherwise it moves to the back. If no other task
    /// is ready the running task keeps the CPU.
    pub fn switch_task(&mut self, sleep_current: bool) {
        let Some(current) = self.ready.pop_front() else {
            return;
        };
        if self.ready.is_empty() {
            if sleep_current {
                warn!("{current:?} is the last ready task and keeps running");
                if let Some(t) = self.tasks.get_mut(&current) {
                    t.wakeup();
                }
            }
            self.ready.push_back(current);
            return;
        }
        if !sleep_current {
            self.ready.push_back(current);
        }
        let Some(&next) = self.ready.front() else {
            return;
        };
        if next == current {
            return;
        }
        trace!("switch {current:?} -> {next:?}");

        let (Some(next_ctx), Some(current_ctx)) = (
            self.tasks
                .get(&next)
                .map(|t| core::ptr::from_ref(t.context())),
            self.tasks
                .get_mut(&current)
                .map(|t| core::ptr::from_mut(t.context_mut())),
        ) else {
            return;
        };
        // SAFETY: both contexts live in boxed tasks owned by `self.tasks`,
        // which are not freed while they are scheduled.
        unsafe { self.cpu.switch_context(next_ctx, current_ctx) };
    }

    /// Put task `id` to sleep. Sleeping the running task switches away from it.
    ///
    /// # Errors
    /// - [`TaskError::NoSuchTask`] for unknown ids.
    /// - [`TaskError::LastReadyTask`] if `id` is the only ready task.
    pub fn sleep(&mut self, id: TaskId) -> Result<(), TaskError> {
        let task = self.tasks.get_mut(&id).ok_or(TaskError::NoSuchTask(id))?;
        if !task.is_running() {
            return Ok(());
        }
        if self.ready.len() == 1 {
            return Err(TaskError::LastReadyTask(id));
        }
        task.sleep();
        if self.ready.front() == Some(&id) {
            self.switch_task(true);
        } else {
            self.ready.retain(|&t| t != id);
        }
        Ok(())
    }

    /// Make task `id` ready. No-op if it already is.
    ///
    /// # Errors
    /// [`TaskError::NoSuchTask`] for unknown ids.
    pub fn wakeup(&mut self, id: TaskId) -> Result<(), TaskError> {
        if !self.tasks.contains_key(&id) {
            return Err(TaskError::NoSuchTask(id));
        }
        self.wake(id);
        Ok(())
    }

    fn wake(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id)
            && !task.is_running()
        {
            task.wakeup();
            self.ready.push_back(id);
        }
    }

    /// Queue `msg` for task `id` without waking it.
    ///
    /// # Errors
    /// [`TaskError::NoSuchTask`] for unknown ids.
    pub fn send_message(&mut self, id: TaskId, msg: Message) -> Result<(), TaskError> {
        self.task_mut(id)?.send_message(msg);
        Ok(())
    }

    /// Pop the next message of task `id`, sleeping until one arrives.
    ///
    /// Only the running task can wait. On return the task is running again.
    ///
    /// # Errors
    /// - [`TaskError::NoSuchTask`] for unknown ids.
    /// - [`TaskError::NotCurrent`] if `id` is not the running task when its
    ///   inbox is empty.
    /// - [`TaskError::LastReadyTask`] if waiting would leave nothing to run.
    pub fn receive_or_sleep(&mut self, id: TaskId) -> Result<Message, TaskError> {
        loop {
            if let Some(msg) = self.task_mut(id)?.receive_message() {
                return Ok(msg);
            }
            if self.current_id() != id {
                return Err(TaskError::NotCurrent(id));
            }
            self.sleep(id)?;
        }
    }

    /// The running task.
    ///
    /// # Panics
    /// Never after construction: the ready queue always has a front.
    #[must_use]
    pub fn current_task(&self) -> &Task {
        &self.tasks[&self.current_id()]
    }

    /// The running task.
    ///
    /// # Panics
    /// See [`current_task`](Self::current_task).
    pub fn current_task_mut(&mut self) -> &mut Task {
        let id = self.current_id();
        self.tasks
            .get_mut(&id)
            .map(Box::as_mut)
            .unwrap_or_else(|| unreachable!("running task {id:?} is not in the task table"))
    }

    /// Id of the running task.
    #[must_use]
    pub fn current_id(&self) -> TaskId {
        self.ready.front().copied().unwrap_or(TaskId::MAIN)
    }

    /// # Errors
    /// [`TaskError::NoSuchTask`] for unknown ids.
    pub fn task(&self, id: TaskId) -> Result<&Task, TaskError> {
        self.tasks
            .get(&id)
            .map(Box::as_ref)
            .ok_or(TaskError::NoSuchTask(id))
    }

    /// # Errors
    /// [`TaskError::NoSuchTask`] for unknown ids.
    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, TaskError> {
        self.tasks
            .get_mut(&id)
            .map(Box::as_mut)
            .ok_or(TaskError::NoSuchTask(id))
    }

    /// Destroy a sleeping task. Its id is never handed out again.
    ///
    /// # Errors
    /// - [`TaskError::NoSuchTask`] for unknown ids.
    /// - [`TaskError::StillScheduled`] if the task is ready or running.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Box<Task>, TaskError> {
        let task = self.task(id)?;
        if task.is_running() {
            return Err(TaskError::StillScheduled(id));
        }
        debug!("removing {id:?}");
        self.tasks.remove(&id).ok_or(TaskError::NoSuchTask(id))
    }

    /// Ready queue from the running task to the back.
    pub fn ready_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.ready.iter().copied()
    }

    /// Number of tasks, sleeping or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub const fn cpu(&self) -> &C {
        &self.cpu
    }

    pub const fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }
}
