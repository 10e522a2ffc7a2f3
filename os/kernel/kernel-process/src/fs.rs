//! The filesystem as seen by the loader.
//!
//! The FAT driver lives outside this crate; the loader only needs to find a
//! directory entry by path and read a whole file into memory.

use bitfield_struct::bitfield;

/// FAT directory-entry attribute byte.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Attributes {
    pub read_only: bool,
    pub hidden: bool,
    pub system: bool,
    pub volume_id: bool,
    pub directory: bool,
    pub archive: bool,
    #[bits(2)]
    __: u8,
}

impl Attributes {
    /// Long-file-name entries set the four low bits at once.
    #[must_use]
    pub const fn is_long_name(&self) -> bool {
        self.read_only() && self.hidden() && self.system() && self.volume_id()
    }
}

/// A short (8.3) FAT directory entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DirectoryEntry {
    /// Space-padded base name followed by the extension.
    pub name: [u8; 11],
    pub attr: Attributes,
    pub first_cluster: u32,
    pub file_size: u32,
}

impl DirectoryEntry {
    /// Identity of the file for the app-load cache.
    ///
    /// A file's first cluster never changes while it exists, so it names the
    /// file independently of the path used to reach it.
    #[must_use]
    pub const fn key(&self) -> FileKey {
        FileKey(self.first_cluster)
    }

    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.attr.directory()
    }

    /// Base name and extension with padding removed.
    #[must_use]
    pub fn base_and_ext(&self) -> (&[u8], &[u8]) {
        fn trim(s: &[u8]) -> &[u8] {
            let end = s.iter().rposition(|&c| c != b' ').map_or(0, |p| p + 1);
            &s[..end]
        }
        (trim(&self.name[..8]), trim(&self.name[8..]))
    }
}

/// Cache key naming one file on disk.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FileKey(u32);

/// Read access to the boot volume.
pub trait FileSystem {
    /// Look `path` up. The flag is `true` if the path ended in a slash,
    /// i.e. the caller asked for a directory.
    fn find_file(&self, path: &str) -> (Option<DirectoryEntry>, bool);

    /// Read the whole file into `buf`, returning the number of bytes read.
    fn load_file(&self, buf: &mut [u8], entry: &DirectoryEntry) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_bits_follow_fat_layout() {
        let attr = Attributes::from_bits(0x10);
        assert!(attr.directory());
        assert!(!attr.is_long_name());
        assert!(Attributes::from_bits(0x0F).is_long_name());
    }

    #[test]
    fn names_are_trimmed() {
        let entry = DirectoryEntry {
            name: *b"HELLO   ELF",
            attr: Attributes::new().with_archive(true),
            first_cluster: 9,
            file_size: 0,
        };
        assert_eq!(entry.base_and_ext(), (&b"HELLO"[..], &b"ELF"[..]));
        assert_eq!(entry.key(), FileKey(9));
        assert!(!entry.is_directory());
    }
}
