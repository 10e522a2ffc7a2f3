//! Builds small ELF64 executables for tests.

#![allow(dead_code)]

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

struct Segment {
    vaddr: u64,
    bytes: Vec<u8>,
    memsz: u64,
    flags: u32,
}

/// An x86-64 `ET_EXEC` image with one `PT_LOAD` per [`segment`](Self::segment).
pub struct ImageBuilder {
    entry: u64,
    segments: Vec<Segment>,
}

impl ImageBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, vaddr: u64, bytes: &[u8], memsz: u64, flags: u32) -> Self {
        self.segments.push(Segment {
            vaddr,
            bytes: bytes.to_vec(),
            memsz,
            flags,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phoff = 64usize;
        let mut data_off = phoff + 56 * self.segments.len();
        let mut image = vec![0u8; data_off];

        image[0..4].copy_from_slice(b"\x7FELF");
        image[4] = 2; // ELFCLASS64
        image[5] = 1; // little-endian
        image[6] = 1; // EV_CURRENT
        image[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        image[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        image[20..24].copy_from_slice(&1u32.to_le_bytes());
        image[24..32].copy_from_slice(&self.entry.to_le_bytes());
        image[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
        image[52..54].copy_from_slice(&64u16.to_le_bytes());
        image[54..56].copy_from_slice(&56u16.to_le_bytes());
        image[56..58].copy_from_slice(&u16::try_from(self.segments.len()).unwrap().to_le_bytes());

        for (i, seg) in self.segments.iter().enumerate() {
            data_off = data_off.next_multiple_of(16);
            image.resize(data_off, 0);
            let ph = phoff + 56 * i;
            image[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            image[ph + 4..ph + 8].copy_from_slice(&seg.flags.to_le_bytes());
            image[ph + 8..ph + 16].copy_from_slice(&(data_off as u64).to_le_bytes());
            image[ph + 16..ph + 24].copy_from_slice(&seg.vaddr.to_le_bytes());
            image[ph + 24..ph + 32].copy_from_slice(&seg.vaddr.to_le_bytes());
            image[ph + 32..ph + 40].copy_from_slice(&(seg.bytes.len() as u64).to_le_bytes());
            image[ph + 40..ph + 48].copy_from_slice(&seg.memsz.to_le_bytes());
            image[ph + 48..ph + 56].copy_from_slice(&0x1000u64.to_le_bytes());
            image.extend_from_slice(&seg.bytes);
            data_off = image.len();
        }
        image
    }
}
