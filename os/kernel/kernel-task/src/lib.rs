//! # Tasks, Scheduling and IPC
//!
//! Cooperative multitasking with timer preemption on a single CPU.
//!
//! - [`Task`]: saved [`TaskContext`], kernel stack, FIFO inbox of
//!   [`Message`]s and the state of the application it runs
//!   ([`ProcessState`]).
//! - [`TaskManager`]: the task table and round-robin ready queue; performs
//!   context switches through the [`TaskCpu`] seam.
//! - [`TimerManager`]: one-shot timers and the periodic task-switch timer.
//! - [`FileDescriptor`] / [`FileTable`]: what an application reads from and
//!   writes to.
//!
//! Nothing in this crate masks interrupts itself; the kernel keeps the
//! manager behind `kernel_sync::SpinLock::lock_irq`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod context;
mod fd;
mod manager;
mod message;
mod task;
mod timer;

pub use crate::context::{FxsaveArea, TaskContext};
pub use crate::fd::{FdError, FileDescriptor, FileTable};
pub use crate::manager::{TaskCpu, TaskManager};
pub use crate::message::{KEYCODE_D, Message, Modifiers};
pub use crate::task::{FileMapping, ProcessState, Task, TaskConfig, TaskId};
pub use crate::timer::{Timer, TimerManager};

/// Errors reported by the task manager.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TaskError {
    /// No task with this id exists.
    #[error("no such task: {0}")]
    NoSuchTask(TaskId),
    /// Sleeping the task would leave the ready queue empty.
    #[error("task {0} is the last ready task")]
    LastReadyTask(TaskId),
    /// Only the running task may block on its inbox.
    #[error("task {0} is not the running task")]
    NotCurrent(TaskId),
    /// The task is still in the ready queue.
    #[error("task {0} is still scheduled")]
    StillScheduled(TaskId),
}
