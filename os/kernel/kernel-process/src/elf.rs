//! Minimal, allocation-free view over an ELF64 executable image.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// Why an image was rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfErr {
    #[error("missing ELF magic")]
    BadMagic,
    #[error("image shorter than the ELF header")]
    TooShort,
    #[error("not a 64-bit ELF image")]
    BadClass,
    #[error("not an x86-64 image")]
    BadMachine,
    #[error("malformed ELF header")]
    BadHeader,
    #[error("not a fixed-address executable")]
    NotExecutable,
    #[error("program header or segment outside the image")]
    Oob,
    #[error("malformed program header")]
    BadPh,
    #[error("segment at {0} lies outside the application region")]
    OutsideAppRegion(VirtualAddress),
}

#[derive(Copy, Clone, Debug)]
#[allow(clippy::struct_field_names)]
pub struct Eh64 {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: VirtualAddress,
    pub e_phoff: u64,
    pub e_phentsize: u16,
    pub e_phnum: u16,
}

#[derive(Copy, Clone, Debug)]
#[allow(clippy::struct_field_names)]
pub struct Ph64 {
    pub p_type: u32,
    pub p_flags: PFlags,
    pub p_offset: u64,
    pub p_vaddr: VirtualAddress,
    pub p_filesz: u64,
    pub p_memsz: u64,
}

impl Ph64 {
    /// One past the last byte of the segment in memory.
    pub fn vaddr_end(&self) -> Result<VirtualAddress, ElfErr> {
        self.p_vaddr.checked_add(self.p_memsz).ok_or(ElfErr::BadPh)
    }
}

/// `Elf64_Phdr.p_flags` (SVr4): bit0=X, bit1=W, bit2=R.
#[bitfield(u32)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool, // PF_X = 1
    #[bits(1)]
    pub write: bool, // PF_W = 2
    #[bits(1)]
    pub read: bool, // PF_R = 4
    #[bits(29)]
    __: u32,
}

impl fmt::Display for PFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            bit(self.read(), 'r'),
            bit(self.write(), 'w'),
            bit(self.execute(), 'x')
        )
    }
}

pub const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
pub const PT_LOAD: u32 = 1;
const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

#[inline]
fn le16(x: &[u8]) -> u16 {
    u16::from_le_bytes([x[0], x[1]])
}

#[inline]
fn le32(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}

#[inline]
fn le64(x: &[u8]) -> u64 {
    u64::from_le_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]])
}

pub struct ElfView<'a> {
    bytes: &'a [u8],
    pub eh: Eh64,
    ph: PhSlice<'a>,
}

/// Validate `bytes` as a little-endian x86-64 `ET_EXEC` image.
///
/// The magic is checked before anything else so that a file which is not an
/// ELF image at all is told apart from a malformed one.
///
/// # Errors
/// See [`ElfErr`].
pub fn elf64_view(bytes: &[u8]) -> Result<ElfView<'_>, ElfErr> {
    use ElfErr::{BadClass, BadHeader, BadMachine, BadMagic, NotExecutable, Oob, TooShort};
    if bytes.get(0..4) != Some(b"\x7FELF".as_slice()) {
        return Err(BadMagic);
    }
    if bytes.len() < EHDR_SIZE {
        return Err(TooShort);
    }

    // ELFCLASS64
    if bytes[4] != 2 {
        return Err(BadClass);
    }

    // little-endian
    if bytes[5] != 1 {
        return Err(BadHeader);
    }

    let eh = Eh64 {
        e_type: le16(&bytes[16..18]),
        e_machine: le16(&bytes[18..20]),
        e_version: le32(&bytes[20..24]),
        e_entry: VirtualAddress::new(le64(&bytes[24..32])),
        e_phoff: le64(&bytes[32..40]),
        e_phentsize: le16(&bytes[54..56]),
        e_phnum: le16(&bytes[56..58]),
    };

    if eh.e_type != ET_EXEC {
        return Err(NotExecutable);
    }

    if eh.e_machine != EM_X86_64 {
        return Err(BadMachine);
    }

    if eh.e_version != 1 {
        return Err(BadHeader);
    }

    if usize::from(eh.e_phentsize) != PHDR_SIZE {
        return Err(BadHeader);
    }

    let phoff = usize::try_from(eh.e_phoff).map_err(|_| Oob)?;
    let phnum = usize::from(eh.e_phnum);
    let need = phoff
        .checked_add(phnum.checked_mul(PHDR_SIZE).ok_or(Oob)?)
        .ok_or(Oob)?;
    if need > bytes.len() {
        return Err(Oob);
    }

    let ph = PhSlice {
        b: bytes,
        off: phoff,
        num: phnum,
    };

    Ok(ElfView { bytes, eh, ph })
}

// Program-header “view” without allocations.
#[derive(Copy, Clone)]
struct PhSlice<'a> {
    b: &'a [u8],
    off: usize,
    num: usize,
}

impl PhSlice<'_> {
    fn get(&self, i: usize) -> Option<Ph64> {
        if i >= self.num {
            return None;
        }
        let p = self.off + i * PHDR_SIZE;
        let s = self.b.get(p..p + PHDR_SIZE)?;
        Some(Ph64 {
            p_type: le32(&s[0..4]),
            p_flags: PFlags::from_bits(le32(&s[4..8])),
            p_offset: le64(&s[8..16]),
            p_vaddr: VirtualAddress::new(le64(&s[16..24])),
            p_filesz: le64(&s[32..40]),
            p_memsz: le64(&s[40..48]),
        })
    }

    const fn len(&self) -> usize {
        self.num
    }
}

pub struct PhIter<'a> {
    ps: PhSlice<'a>,
    i: usize,
}

impl Iterator for PhIter<'_> {
    type Item = Ph64;
    fn next(&mut self) -> Option<Self::Item> {
        let v = self.ps.get(self.i)?;
        self.i += 1;
        Some(v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.ps.len().saturating_sub(self.i);
        (r, Some(r))
    }
}

impl core::iter::FusedIterator for PhIter<'_> {}

impl<'a> ElfView<'a> {
    /// Iterate all program headers.
    pub const fn iter_ph(&self) -> PhIter<'a> {
        PhIter { ps: self.ph, i: 0 }
    }

    /// Iterate only `PT_LOAD` headers (filtering at the edge).
    pub fn iter_pt_load(&self) -> impl Iterator<Item = Ph64> + 'a {
        self.iter_ph().filter(|ph| ph.p_type == PT_LOAD)
    }

    /// Virtual address of the first `PT_LOAD` segment, zero if there is none.
    pub fn first_load_address(&self) -> VirtualAddress {
        self.iter_pt_load()
            .next()
            .map_or(VirtualAddress::zero(), |ph| ph.p_vaddr)
    }

    pub const fn entry(&self) -> VirtualAddress {
        self.eh.e_entry
    }

    /// Get the file bytes backing a `PT_LOAD` (filesz may be < memsz).
    ///
    /// # Errors
    /// [`ElfErr::Oob`] if the segment extends past the image,
    /// [`ElfErr::BadPh`] if `p_filesz > p_memsz`.
    pub fn segment_file_bytes(&self, ph: &Ph64) -> Result<&'a [u8], ElfErr> {
        if ph.p_filesz > ph.p_memsz {
            return Err(ElfErr::BadPh);
        }
        let off = usize::try_from(ph.p_offset).map_err(|_| ElfErr::Oob)?;
        let sz = usize::try_from(ph.p_filesz).map_err(|_| ElfErr::Oob)?;
        let end = off.checked_add(sz).ok_or(ElfErr::Oob)?;
        self.bytes.get(off..end).ok_or(ElfErr::Oob)
    }
}
