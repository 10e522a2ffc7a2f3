//! Standard streams of applications started from the kernel console.
//!
//! Output goes to QEMU's debug console; input arrives as key messages in the
//! inbox of the task running the application.

use crate::KernelContext;
use alloc::boxed::Box;
use kernel_process::RootSwitch;
use kernel_process::terminal::{Inbox, Terminal, TerminalFd};
use kernel_qemu::DebugConsole;
use kernel_sync::SpinLock;
use kernel_task::{FileDescriptor, Message, TaskCpu, TaskError};
use kernel_vmem::{FrameAlloc, PhysMapper};

/// Terminal output on the debug console.
#[derive(Debug, Default, Copy, Clone)]
pub struct ConsoleTerminal;

impl Terminal for ConsoleTerminal {
    fn print(&self, bytes: &[u8]) {
        DebugConsole.write_bytes(bytes);
    }
}

/// The inbox of whichever task is running when `receive` is called.
pub struct TaskInbox<'k, M, A, C: TaskCpu> {
    kernel: &'k SpinLock<KernelContext<M, A, C>>,
}

impl<'k, M, A, C: TaskCpu> TaskInbox<'k, M, A, C> {
    pub const fn new(kernel: &'k SpinLock<KernelContext<M, A, C>>) -> Self {
        Self { kernel }
    }
}

impl<M, A, C> Inbox for TaskInbox<'_, M, A, C>
where
    M: PhysMapper,
    A: FrameAlloc,
    C: TaskCpu + RootSwitch + Clone,
    KernelContext<M, A, C>: Send,
{
    fn receive(&self) -> Result<Message, TaskError> {
        self.kernel.lock_irq().receive()
    }
}

/// A fresh stdin/stdout/stderr descriptor for an application launched on
/// the console.
pub fn console_stdio<M, A, C>(kernel: &'static SpinLock<KernelContext<M, A, C>>) -> Box<dyn FileDescriptor>
where
    M: PhysMapper + 'static,
    A: FrameAlloc + 'static,
    C: TaskCpu + RootSwitch + Clone + 'static,
    KernelContext<M, A, C>: Send,
{
    Box::new(TerminalFd::new(ConsoleTerminal, TaskInbox::new(kernel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::kernel;
    use kernel_task::TaskId;

    #[test]
    fn inbox_reads_the_running_task() {
        let k = kernel();
        let lock = SpinLock::new(k);
        lock.lock()
            .tasks
            .send_message(TaskId::MAIN, Message::key_press(4, b'a'))
            .unwrap();

        let inbox = TaskInbox::new(&lock);
        assert_eq!(inbox.receive(), Ok(Message::key_press(4, b'a')));
        assert_eq!(inbox.receive(), Err(TaskError::LastReadyTask(TaskId::MAIN)));
    }

    #[test]
    fn console_descriptors_read_keys_until_input_runs_dry() {
        let lock: &'static _ = Box::leak(Box::new(SpinLock::new(kernel())));
        {
            let mut k = lock.lock();
            k.tasks
                .send_message(TaskId::MAIN, Message::key_press(5, b'b'))
                .unwrap();
        }
        let mut stdin = console_stdio(lock);
        let mut buf = [0u8; 4];
        assert_eq!(stdin.read(&mut buf), Ok(1));
        assert_eq!(buf[0], b'b');
        assert_eq!(stdin.read(&mut buf), Ok(0));
        assert_eq!(stdin.write(b"ok\n"), Ok(3));
    }
}
