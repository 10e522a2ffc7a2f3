//! The argument page handed to an application.
//!
//! ```text
//! ARGS_FRAME + 0x000  argv[0..ARGV_LEN]   pointers, unused slots zero
//! ARGS_FRAME + 0x100  "cmd\0arg1\0arg2\0" packed strings
//! ```
//!
//! Every pointer refers to a string inside the same page.

use crate::ExecError;
use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::{ARGBUF_LEN, ARGV_LEN};
use kernel_memory_addresses::VirtualAddress;

const ARGBUF_OFFSET: usize = ARGV_LEN * size_of::<u64>();
const PAGE_BYTES: usize = ARGBUF_OFFSET + ARGBUF_LEN;

/// The argument page, built in kernel memory before it is copied to the
/// application's address space.
#[derive(Debug)]
pub struct ArgPage {
    base: VirtualAddress,
    page: Vec<u8>,
    argc: usize,
    buf_used: usize,
}

impl ArgPage {
    /// Build the page for `command` followed by the whitespace-separated
    /// words of `args`, as seen at virtual address `base`.
    ///
    /// # Errors
    /// [`ExecError::Full`] if the pointer slots or the string buffer run out.
    pub fn build(base: VirtualAddress, command: &str, args: &str) -> Result<Self, ExecError> {
        let mut this = Self {
            base,
            page: vec![0; PAGE_BYTES],
            argc: 0,
            buf_used: 0,
        };
        this.push(command)?;
        for word in args.split(is_space).filter(|w| !w.is_empty()) {
            this.push(word)?;
        }
        Ok(this)
    }

    fn push(&mut self, arg: &str) -> Result<(), ExecError> {
        let len = arg.len() + 1;
        if self.argc >= ARGV_LEN || self.buf_used + len > ARGBUF_LEN {
            return Err(ExecError::Full);
        }
        let at = ARGBUF_OFFSET + self.buf_used;
        self.page[at..at + arg.len()].copy_from_slice(arg.as_bytes());
        self.page[at + arg.len()] = 0;

        let ptr = self.base + at as u64;
        let slot = self.argc * size_of::<u64>();
        self.page[slot..slot + 8].copy_from_slice(&ptr.as_u64().to_le_bytes());

        self.argc += 1;
        self.buf_used += len;
        Ok(())
    }

    #[must_use]
    pub const fn argc(&self) -> usize {
        self.argc
    }

    /// Address of `argv[0]` in the application's address space.
    #[must_use]
    pub const fn argv(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.page
    }
}

/// C `isspace` in the "C" locale.
const fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
}
