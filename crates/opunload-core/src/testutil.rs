//! Test fixtures: synthesised little-endian ELF images.

use byteorder::{LittleEndian, WriteBytesExt};

struct SegmentSpec {
    p_type: u32,
    vaddr: u64,
    paddr: u64,
    memsz: u64,
    bytes: Vec<u8>,
}

/// Builds a minimal ELF with a program header table and segment data.
pub struct ElfBuilder {
    is_64: bool,
    segments: Vec<SegmentSpec>,
}

impl ElfBuilder {
    pub fn elf64() -> Self {
        Self {
            is_64: true,
            segments: Vec::new(),
        }
    }

    pub fn elf32() -> Self {
        Self {
            is_64: false,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, p_type: u32, vaddr: u64, paddr: u64, memsz: u64, bytes: &[u8]) -> Self {
        self.segments.push(SegmentSpec {
            p_type,
            vaddr,
            paddr,
            memsz,
            bytes: bytes.to_vec(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let (ehsize, phentsize) = if self.is_64 { (64u64, 56u64) } else { (52, 32) };
        let phoff = ehsize;
        let mut data_offset = phoff + phentsize * self.segments.len() as u64;

        let mut out = Vec::new();
        out.extend_from_slice(b"\x7FELF");
        out.push(if self.is_64 { 2 } else { 1 });
        out.push(1); // little-endian
        out.push(1); // EV_CURRENT
        out.resize(16, 0);
        out.write_u16::<LittleEndian>(2).unwrap(); // ET_EXEC
        out.write_u16::<LittleEndian>(0xB7).unwrap(); // EM_AARCH64
        out.write_u32::<LittleEndian>(1).unwrap();
        if self.is_64 {
            out.write_u64::<LittleEndian>(0).unwrap(); // e_entry
            out.write_u64::<LittleEndian>(phoff).unwrap();
            out.write_u64::<LittleEndian>(0).unwrap(); // e_shoff
        } else {
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(phoff as u32).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
        }
        out.write_u32::<LittleEndian>(0).unwrap(); // e_flags
        out.write_u16::<LittleEndian>(ehsize as u16).unwrap();
        out.write_u16::<LittleEndian>(phentsize as u16).unwrap();
        out.write_u16::<LittleEndian>(self.segments.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // e_shentsize
        out.write_u16::<LittleEndian>(0).unwrap(); // e_shnum
        out.write_u16::<LittleEndian>(0).unwrap(); // e_shstrndx
        assert_eq!(out.len() as u64, ehsize);

        for seg in &self.segments {
            let filesz = seg.bytes.len() as u64;
            let offset = if filesz == 0 { 0 } else { data_offset };
            if self.is_64 {
                out.write_u32::<LittleEndian>(seg.p_type).unwrap();
                out.write_u32::<LittleEndian>(5).unwrap(); // p_flags
                out.write_u64::<LittleEndian>(offset).unwrap();
                out.write_u64::<LittleEndian>(seg.vaddr).unwrap();
                out.write_u64::<LittleEndian>(seg.paddr).unwrap();
                out.write_u64::<LittleEndian>(filesz).unwrap();
                out.write_u64::<LittleEndian>(seg.memsz).unwrap();
                out.write_u64::<LittleEndian>(0x1000).unwrap(); // p_align
            } else {
                out.write_u32::<LittleEndian>(seg.p_type).unwrap();
                out.write_u32::<LittleEndian>(offset as u32).unwrap();
                out.write_u32::<LittleEndian>(seg.vaddr as u32).unwrap();
                out.write_u32::<LittleEndian>(seg.paddr as u32).unwrap();
                out.write_u32::<LittleEndian>(filesz as u32).unwrap();
                out.write_u32::<LittleEndian>(seg.memsz as u32).unwrap();
                out.write_u32::<LittleEndian>(5).unwrap();
                out.write_u32::<LittleEndian>(0x1000).unwrap();
            }
            data_offset += filesz;
        }

        for seg in &self.segments {
            out.extend_from_slice(&seg.bytes);
        }
        out
    }
}
