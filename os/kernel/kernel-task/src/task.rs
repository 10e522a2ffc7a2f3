//! # Task
//!
//! One schedulable unit: a saved register context, a dedicated kernel stack,
//! a FIFO inbox and the per-process bookkeeping used while the task runs an
//! application.

use crate::context::{FxsaveArea, TaskContext};
use crate::fd::FileTable;
use crate::message::Message;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use kernel_info::task::{INITIAL_RFLAGS, KERNEL_CS, KERNEL_SS, MAIN_TASK_ID, TASK_STACK_BYTES};
use kernel_memory_addresses::VirtualAddress;

/// Unique, never reused task identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// The task representing the boot flow.
    pub const MAIN: Self = Self(MAIN_TASK_ID);

    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Task construction parameters.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TaskConfig {
    /// Kernel stack size; rounded up to a multiple of 16.
    pub stack_bytes: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            stack_bytes: TASK_STACK_BYTES,
        }
    }
}

/// A memory-mapped file: faults in `vaddr_begin..vaddr_end` are served
/// from descriptor `fd`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FileMapping {
    pub fd: usize,
    pub vaddr_begin: VirtualAddress,
    pub vaddr_end: VirtualAddress,
}

impl FileMapping {
    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.vaddr_begin <= va && va < self.vaddr_end
    }
}

/// State of the application a task is currently running.
#[derive(Default)]
pub struct ProcessState {
    /// Open descriptors; `0..3` are stdin, stdout and stderr.
    pub files: FileTable,
    /// First address of the demand-paging window.
    pub dpaging_begin: VirtualAddress,
    /// One past the last address of the demand-paging window.
    pub dpaging_end: VirtualAddress,
    /// Upper bound for the next file mapping; mappings grow downwards.
    pub file_map_end: VirtualAddress,
    pub file_maps: Vec<FileMapping>,
    /// Kernel stack pointer saved on entry to user mode.
    pub os_stack_pointer: u64,
}

impl ProcessState {
    /// Drop all descriptors and file mappings.
    pub fn clear(&mut self) {
        self.files.clear();
        self.file_maps.clear();
    }

    /// `true` if a fault at `va` is resolved by demand paging.
    #[must_use]
    pub fn in_demand_window(&self, va: VirtualAddress) -> bool {
        self.dpaging_begin <= va && va < self.dpaging_end
    }

    /// The file mapping covering `va`, if any.
    #[must_use]
    pub fn file_mapping_at(&self, va: VirtualAddress) -> Option<FileMapping> {
        self.file_maps.iter().copied().find(|m| m.contains(va))
    }
}

/// A schedulable unit.
///
/// Tasks are owned by the [`TaskManager`](crate::TaskManager) and boxed there,
/// so the address of [`context`](Self::context) is stable for the task's
/// lifetime.
pub struct Task {
    id: TaskId,
    stack: Vec<u64>,
    context: TaskContext,
    inbox: VecDeque<Message>,
    running: bool,
    process: ProcessState,
}

impl Task {
    pub(crate) fn new(id: TaskId, config: &TaskConfig) -> Self {
        let words = config.stack_bytes.next_multiple_of(16) / size_of::<u64>();
        Self {
            id,
            stack: vec![0; words],
            context: TaskContext::zeroed(),
            inbox: VecDeque::new(),
            running: false,
            process: ProcessState::default(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Prepare the context so that the first switch to this task calls
    /// `entry(argument, task_id)` on its own stack with root table `cr3`.
    ///
    /// The stack pointer is placed 8 bytes below a 16-byte boundary, the
    /// state right after a `call`. Interrupts are enabled, kernel segments are
    /// selected and all SIMD exceptions are masked.
    pub fn init_context(&mut self, entry: VirtualAddress, argument: u64, cr3: u64) -> &mut Self {
        let stack_top = self.stack_top();
        let ctx = &mut self.context;
        *ctx = TaskContext::zeroed();
        ctx.rip = entry.as_u64();
        ctx.rdi = argument;
        ctx.rsi = self.id.as_u64();
        ctx.cr3 = cr3;
        ctx.rflags = INITIAL_RFLAGS;
        ctx.cs = u64::from(KERNEL_CS);
        ctx.ss = u64::from(KERNEL_SS);
        ctx.rsp = (stack_top & !0xF) - 8;
        ctx.fxsave_area = FxsaveArea::initial();
        self
    }

    /// One past the highest byte of the task's stack.
    #[must_use]
    pub fn stack_top(&self) -> u64 {
        self.stack.as_ptr_range().end as u64
    }

    #[inline]
    #[must_use]
    pub const fn context(&self) -> &TaskContext {
        &self.context
    }

    #[inline]
    pub const fn context_mut(&mut self) -> &mut TaskContext {
        &mut self.context
    }

    /// Mark the task as not runnable. The queue is the manager's business.
    pub const fn sleep(&mut self) -> &mut Self {
        self.running = false;
        self
    }

    /// Mark the task as runnable.
    pub const fn wakeup(&mut self) -> &mut Self {
        self.running = true;
        self
    }

    /// `true` while the task is in the ready queue.
    #[inline]
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Append `msg` to the inbox.
    pub fn send_message(&mut self, msg: Message) {
        self.inbox.push_back(msg);
    }

    /// Pop the oldest message, if any. Never blocks.
    pub fn receive_message(&mut self) -> Option<Message> {
        self.inbox.pop_front()
    }

    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    #[inline]
    #[must_use]
    pub const fn process(&self) -> &ProcessState {
        &self.process
    }

    #[inline]
    pub const fn process_mut(&mut self) -> &mut ProcessState {
        &mut self.process
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("running", &self.running)
            .field("inbox", &self.inbox.len())
            .field("rip", &format_args!("{:#x}", self.context.rip))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_rounded_up_to_sixteen_bytes() {
        let t = Task::new(TaskId::new(2), &TaskConfig { stack_bytes: 100 });
        assert_eq!(t.stack.len() * 8, 112);
    }

    #[test]
    fn init_context_prepares_kernel_entry() {
        let mut t = Task::new(TaskId::new(5), &TaskConfig::default());
        t.init_context(VirtualAddress::new(0xFFFF_FFFF_8000_1000), 42, 0x1000);
        let ctx = t.context();
        assert_eq!(ctx.rip, 0xFFFF_FFFF_8000_1000);
        assert_eq!(ctx.rdi, 42);
        assert_eq!(ctx.rsi, 5);
        assert_eq!(ctx.cr3, 0x1000);
        assert_eq!(ctx.rflags, 0x202);
        assert_eq!(ctx.cs, 8);
        assert_eq!(ctx.ss, 16);
        assert_eq!((ctx.rsp + 8) % 16, 0);
        assert!(ctx.rsp < t.stack_top());
        assert!(ctx.rsp >= t.stack_top() - 24);
        assert_eq!(ctx.fxsave_area.mxcsr(), 0x1F80);
    }

    #[test]
    fn inbox_is_fifo() {
        let mut t = Task::new(TaskId::new(2), &TaskConfig::default());
        assert_eq!(t.receive_message(), None);
        t.send_message(Message::key_press(4, b'a'));
        t.send_message(Message::key_press(5, b'b'));
        assert_eq!(t.receive_message(), Some(Message::key_press(4, b'a')));
        assert_eq!(t.receive_message(), Some(Message::key_press(5, b'b')));
        assert_eq!(t.receive_message(), None);
    }

    #[test]
    fn process_windows() {
        let mut p = ProcessState::default();
        p.dpaging_begin = VirtualAddress::new(0xFFFF_8000_0010_0000);
        p.dpaging_end = VirtualAddress::new(0xFFFF_8000_0010_2000);
        assert!(p.in_demand_window(VirtualAddress::new(0xFFFF_8000_0010_1FFF)));
        assert!(!p.in_demand_window(VirtualAddress::new(0xFFFF_8000_0010_2000)));

        p.file_maps.push(FileMapping {
            fd: 3,
            vaddr_begin: VirtualAddress::new(0xFFFF_FFFF_FFF0_0000),
            vaddr_end: VirtualAddress::new(0xFFFF_FFFF_FFF0_3000),
        });
        assert_eq!(
            p.file_mapping_at(VirtualAddress::new(0xFFFF_FFFF_FFF0_2000)).map(|m| m.fd),
            Some(3)
        );
        p.clear();
        assert!(p.file_maps.is_empty());
    }
}
