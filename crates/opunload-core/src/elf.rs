//! Minimal ELF program-header reader.
//!
//! Only what the loader needs: the program header table, in file order,
//! with each segment's file-backed bytes. Handles ELF32/ELF64 in either
//! byte order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

/// Program header type of a loadable segment.
pub const PT_LOAD: u32 = 1;

const ELF_MAGIC: &[u8; 4] = b"\x7FELF";
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const ELF32_HEADER_SIZE: usize = 52;
const ELF64_HEADER_SIZE: usize = 64;
const ELF32_PHDR_SIZE: usize = 32;
const ELF64_PHDR_SIZE: usize = 56;

#[derive(Error, Debug)]
pub enum ElfError {
    #[error("File too small: {actual} bytes, minimum {minimum}")]
    FileTooSmall { actual: usize, minimum: usize },
    #[error("Invalid ELF magic")]
    InvalidMagic,
    #[error("Unsupported ELF class {0}")]
    UnsupportedClass(u8),
    #[error("Unsupported ELF data encoding {0}")]
    UnsupportedEncoding(u8),
    #[error("Program header entry size {actual} smaller than {minimum}")]
    InvalidEntrySize { actual: usize, minimum: usize },
    #[error("Program header table at 0x{offset:X} ({len} bytes) exceeds file size {file_size}")]
    TableOutOfBounds {
        offset: u64,
        len: u64,
        file_size: usize,
    },
    #[error("Segment {index} data at 0x{offset:X} ({len} bytes) exceeds file size {file_size}")]
    SegmentOutOfBounds {
        index: usize,
        offset: u64,
        len: u64,
        file_size: usize,
    },
}

/// One program header with its file-backed data.
///
/// Only `PT_LOAD` headers carry `file_bytes`; for every other type the
/// slice is empty and its file range is never read or checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHeader<'data> {
    pub p_type: u32,
    pub virtual_address: u64,
    pub physical_address: u64,
    pub mem_size: u64,
    pub file_bytes: &'data [u8],
}

impl ProgramHeader<'_> {
    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }
}

/// Source of program headers, in file order.
pub trait ElfReader<'data> {
    fn program_headers(&self) -> Result<Vec<ProgramHeader<'data>>, ElfError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfEncoding {
    Little,
    Big,
}

/// Parsed ELF identification and program header table location.
#[derive(Debug, Clone)]
pub struct ElfFile<'data> {
    data: &'data [u8],
    class: ElfClass,
    encoding: ElfEncoding,
    phoff: u64,
    phentsize: usize,
    phnum: usize,
}

impl<'data> ElfFile<'data> {
    /// Validate the ELF header and locate the program header table.
    pub fn parse(data: &'data [u8]) -> Result<Self, ElfError> {
        if data.len() < EI_DATA + 1 {
            return Err(ElfError::FileTooSmall {
                actual: data.len(),
                minimum: ELF32_HEADER_SIZE,
            });
        }
        if &data[..4] != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }

        let class = match data[EI_CLASS] {
            ELFCLASS32 => ElfClass::Elf32,
            ELFCLASS64 => ElfClass::Elf64,
            other => return Err(ElfError::UnsupportedClass(other)),
        };
        let encoding = match data[EI_DATA] {
            ELFDATA2LSB => ElfEncoding::Little,
            ELFDATA2MSB => ElfEncoding::Big,
            other => return Err(ElfError::UnsupportedEncoding(other)),
        };

        let (header_size, min_phentsize) = match class {
            ElfClass::Elf32 => (ELF32_HEADER_SIZE, ELF32_PHDR_SIZE),
            ElfClass::Elf64 => (ELF64_HEADER_SIZE, ELF64_PHDR_SIZE),
        };
        if data.len() < header_size {
            return Err(ElfError::FileTooSmall {
                actual: data.len(),
                minimum: header_size,
            });
        }

        let mut elf = Self {
            data,
            class,
            encoding,
            phoff: 0,
            phentsize: 0,
            phnum: 0,
        };
        match class {
            ElfClass::Elf32 => {
                elf.phoff = elf.u32_at(0x1C) as u64;
                elf.phentsize = elf.u16_at(0x2A) as usize;
                elf.phnum = elf.u16_at(0x2C) as usize;
            }
            ElfClass::Elf64 => {
                elf.phoff = elf.u64_at(0x20);
                elf.phentsize = elf.u16_at(0x36) as usize;
                elf.phnum = elf.u16_at(0x38) as usize;
            }
        }

        if elf.phnum == 0 {
            return Ok(elf);
        }
        if elf.phentsize < min_phentsize {
            return Err(ElfError::InvalidEntrySize {
                actual: elf.phentsize,
                minimum: min_phentsize,
            });
        }

        let table_len = (elf.phentsize as u64) * (elf.phnum as u64);
        let fits = elf
            .phoff
            .checked_add(table_len)
            .is_some_and(|end| end <= data.len() as u64);
        if !fits {
            return Err(ElfError::TableOutOfBounds {
                offset: elf.phoff,
                len: table_len,
                file_size: data.len(),
            });
        }

        Ok(elf)
    }

    pub fn class(&self) -> ElfClass {
        self.class
    }

    pub fn encoding(&self) -> ElfEncoding {
        self.encoding
    }

    // Callers bounds-check before reading.
    fn u16_at(&self, offset: usize) -> u16 {
        let buf = &self.data[offset..offset + 2];
        match self.encoding {
            ElfEncoding::Little => LittleEndian::read_u16(buf),
            ElfEncoding::Big => BigEndian::read_u16(buf),
        }
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let buf = &self.data[offset..offset + 4];
        match self.encoding {
            ElfEncoding::Little => LittleEndian::read_u32(buf),
            ElfEncoding::Big => BigEndian::read_u32(buf),
        }
    }

    fn u64_at(&self, offset: usize) -> u64 {
        let buf = &self.data[offset..offset + 8];
        match self.encoding {
            ElfEncoding::Little => LittleEndian::read_u64(buf),
            ElfEncoding::Big => BigEndian::read_u64(buf),
        }
    }

    fn header_at(&self, index: usize) -> Result<ProgramHeader<'data>, ElfError> {
        let base = self.phoff as usize + index * self.phentsize;
        let (p_type, offset, vaddr, paddr, filesz, memsz) = match self.class {
            ElfClass::Elf32 => (
                self.u32_at(base),
                self.u32_at(base + 4) as u64,
                self.u32_at(base + 8) as u64,
                self.u32_at(base + 12) as u64,
                self.u32_at(base + 16) as u64,
                self.u32_at(base + 20) as u64,
            ),
            ElfClass::Elf64 => (
                self.u32_at(base),
                self.u64_at(base + 8),
                self.u64_at(base + 16),
                self.u64_at(base + 24),
                self.u64_at(base + 32),
                self.u64_at(base + 40),
            ),
        };

        let file_bytes: &'data [u8] = if filesz == 0 || p_type != PT_LOAD {
            &[]
        } else {
            let data = self.data;
            offset
                .checked_add(filesz)
                .filter(|end| *end <= data.len() as u64)
                .map(|end| &data[offset as usize..end as usize])
                .ok_or(ElfError::SegmentOutOfBounds {
                    index,
                    offset,
                    len: filesz,
                    file_size: data.len(),
                })?
        };

        Ok(ProgramHeader {
            p_type,
            virtual_address: vaddr,
            physical_address: paddr,
            mem_size: memsz,
            file_bytes,
        })
    }
}

impl<'data> ElfReader<'data> for ElfFile<'data> {
    fn program_headers(&self) -> Result<Vec<ProgramHeader<'data>>, ElfError> {
        (0..self.phnum).map(|i| self.header_at(i)).collect()
    }
}
