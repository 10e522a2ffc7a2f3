//! Standard streams of an application launched from a terminal.

use kernel_task::{FdError, FileDescriptor, KEYCODE_D, Message, TaskError};
use log::warn;

/// Output side of a terminal window.
pub trait Terminal: Send {
    fn print(&self, bytes: &[u8]);
}

/// Blocking access to the inbox of the task the application runs in.
pub trait Inbox: Send {
    /// Next message, sleeping until one arrives.
    ///
    /// # Errors
    /// When the task cannot wait, e.g. because it is the last ready task.
    fn receive(&self) -> Result<Message, TaskError>;
}

/// stdin, stdout and stderr of an application: keys from the task's inbox
/// in, terminal text out.
pub struct TerminalFd<T, I> {
    terminal: T,
    inbox: I,
}

impl<T: Terminal, I: Inbox> TerminalFd<T, I> {
    pub const fn new(terminal: T, inbox: I) -> Self {
        Self { terminal, inbox }
    }
}

impl<T: Terminal, I: Inbox> FileDescriptor for TerminalFd<T, I> {
    /// Read one typed character and echo it.
    ///
    /// Key releases and other messages are dropped. Control combinations are
    /// echoed as `^X` and otherwise ignored; `^D` ends the input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FdError> {
        let Some(first) = buf.first_mut() else {
            return Ok(0);
        };
        loop {
            let msg = match self.inbox.receive() {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("terminal read ends: {e}");
                    return Ok(0);
                }
            };
            let Message::KeyPush {
                modifier,
                keycode,
                ascii,
                press: true,
            } = msg
            else {
                continue;
            };
            if modifier.control() {
                self.terminal.print(&[b'^', ascii.to_ascii_uppercase()]);
                if keycode == KEYCODE_D {
                    return Ok(0);
                }
                continue;
            }
            *first = ascii;
            self.terminal.print(&[ascii]);
            return Ok(1);
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FdError> {
        self.terminal.print(buf);
        Ok(buf.len())
    }

    fn size(&self) -> usize {
        0
    }

    fn load(&mut self, _buf: &mut [u8], _offset: usize) -> Result<usize, FdError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_task::{Modifiers, TaskId};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Screen(Arc<Mutex<Vec<u8>>>);

    impl Terminal for Screen {
        fn print(&self, bytes: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(bytes);
        }
    }

    #[derive(Default)]
    struct Keys(Mutex<VecDeque<Message>>);

    impl Inbox for Arc<Keys> {
        fn receive(&self) -> Result<Message, TaskError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TaskError::LastReadyTask(TaskId::MAIN))
        }
    }

    fn fd(msgs: &[Message]) -> (TerminalFd<Screen, Arc<Keys>>, Screen) {
        let screen = Screen::default();
        let keys = Arc::new(Keys::default());
        keys.0.lock().unwrap().extend(msgs.iter().copied());
        (TerminalFd::new(screen.clone(), keys), screen)
    }

    fn ctrl(keycode: u8, ascii: u8) -> Message {
        Message::KeyPush {
            modifier: Modifiers::new().with_left_control(true),
            keycode,
            ascii,
            press: true,
        }
    }

    #[test]
    fn reads_and_echoes_one_key() {
        let release = Message::KeyPush {
            modifier: Modifiers::new(),
            keycode: 4,
            ascii: b'a',
            press: false,
        };
        let timer = Message::TimerTimeout { timeout: 1, value: 2 };
        let (mut fd, screen) = fd(&[release, timer, Message::key_press(5, b'b')]);
        let mut buf = [0u8; 8];
        assert_eq!(fd.read(&mut buf), Ok(1));
        assert_eq!(buf[0], b'b');
        assert_eq!(*screen.0.lock().unwrap(), b"b");
    }

    #[test]
    fn control_d_is_end_of_input() {
        let (mut fd, screen) = fd(&[ctrl(6, b'c'), ctrl(KEYCODE_D, b'd')]);
        let mut buf = [0u8; 1];
        assert_eq!(fd.read(&mut buf), Ok(0));
        assert_eq!(*screen.0.lock().unwrap(), b"^C^D");
    }

    #[test]
    fn write_prints_everything() {
        let (mut fd, screen) = fd(&[]);
        assert_eq!(fd.write(b"hello\n"), Ok(6));
        assert_eq!(*screen.0.lock().unwrap(), b"hello\n");
        assert_eq!(fd.size(), 0);
        assert_eq!(fd.load(&mut [0; 16], 0), Ok(0));
    }

    #[test]
    fn read_without_a_waiting_task_is_end_of_input() {
        let (mut fd, _) = fd(&[]);
        assert_eq!(fd.read(&mut [0; 1]), Ok(0));
    }
}
