//! Loaded-image templates, keyed by file.
//!
//! The first load of a file builds its segments into a template address
//! space that is kept for the lifetime of the kernel. Later loads copy the
//! template's application half and share its frames read-only. Entries are
//! never invalidated: replacing a file on disk while the kernel runs keeps
//! serving the old image.

use crate::fs::FileKey;
use alloc::collections::BTreeMap;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::RootPage;

/// What a successful load produced.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AppLoadInfo {
    /// One past the highest byte of any loaded segment.
    pub vaddr_end: VirtualAddress,
    pub entry_point: VirtualAddress,
    /// For cached entries: the template root. For a returned load: the root
    /// the task will run in.
    pub root_table: RootPage,
}

impl AppLoadInfo {
    /// The same image, rooted elsewhere.
    #[must_use]
    pub const fn with_root(self, root_table: RootPage) -> Self {
        Self { root_table, ..self }
    }
}

#[derive(Debug, Default)]
pub struct AppLoadCache {
    entries: BTreeMap<FileKey, AppLoadInfo>,
}

impl AppLoadCache {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: FileKey) -> Option<AppLoadInfo> {
        self.entries.get(&key).copied()
    }

    /// Record the template for `key`. An existing entry is kept.
    pub fn insert(&mut self, key: FileKey, info: AppLoadInfo) -> AppLoadInfo {
        *self.entries.entry(key).or_insert(info)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
