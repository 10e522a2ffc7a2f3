//! File descriptors owned by a task.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Errors reported by file-descriptor operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FdError {
    /// The descriptor does not support the operation.
    #[error("operation not supported by this file descriptor")]
    Unsupported,
    /// The descriptor slot is empty or out of range.
    #[error("bad file descriptor {0}")]
    BadFileDescriptor(usize),
}

/// An open file as seen by an application.
///
/// All sizes and return values are in bytes. A `read` returning `0` means end
/// of input.
pub trait FileDescriptor: Send {
    /// Read up to `buf.len()` bytes, blocking the calling task if needed.
    ///
    /// # Errors
    /// Descriptor-specific.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FdError>;

    /// Write `buf`, returning the number of bytes consumed.
    ///
    /// # Errors
    /// Descriptor-specific.
    fn write(&mut self, buf: &[u8]) -> Result<usize, FdError>;

    /// Size of the underlying file, `0` for streams.
    fn size(&self) -> usize;

    /// Copy up to `buf.len()` bytes starting at `offset` without moving any
    /// read position. Used to populate memory-mapped pages.
    ///
    /// # Errors
    /// Descriptor-specific.
    fn load(&mut self, buf: &mut [u8], offset: usize) -> Result<usize, FdError>;
}

/// A task's descriptor table. Slot numbers are the descriptor values handed
/// to the application.
#[derive(Default)]
pub struct FileTable {
    slots: Vec<Option<Box<dyn FileDescriptor>>>,
}

impl FileTable {
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Install `fd` in the lowest free slot and return its number.
    pub fn install(&mut self, fd: Box<dyn FileDescriptor>) -> usize {
        if let Some(i) = self.slots.iter().position(Option::is_none) {
            self.slots[i] = Some(fd);
            return i;
        }
        self.slots.push(Some(fd));
        self.slots.len() - 1
    }

    /// Close descriptor `n`, returning it.
    ///
    /// # Errors
    /// [`FdError::BadFileDescriptor`] if `n` is not open.
    pub fn close(&mut self, n: usize) -> Result<Box<dyn FileDescriptor>, FdError> {
        self.slots
            .get_mut(n)
            .and_then(Option::take)
            .ok_or(FdError::BadFileDescriptor(n))
    }

    /// # Errors
    /// [`FdError::BadFileDescriptor`] if `n` is not open.
    pub fn get_mut(&mut self, n: usize) -> Result<&mut (dyn FileDescriptor + 'static), FdError> {
        match self.slots.get_mut(n) {
            Some(Some(fd)) => Ok(fd.as_mut()),
            _ => Err(FdError::BadFileDescriptor(n)),
        }
    }

    /// Temporarily remove descriptor `n` so it can be used without borrowing
    /// the task; hand it back with [`restore`](Self::restore).
    ///
    /// # Errors
    /// [`FdError::BadFileDescriptor`] if `n` is not open.
    pub fn take(&mut self, n: usize) -> Result<Box<dyn FileDescriptor>, FdError> {
        self.close(n)
    }

    /// Put back a descriptor obtained from [`take`](Self::take).
    pub fn restore(&mut self, n: usize, fd: Box<dyn FileDescriptor>) {
        if self.slots.len() <= n {
            self.slots.resize_with(n + 1, || None);
        }
        self.slots[n] = Some(fd);
    }

    /// Number of open descriptors.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Close everything.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
