//! Loadable ELF segments and their wire encoding.
//!
//! Each non-empty `PT_LOAD` segment travels as its own frame:
//! 8-byte load address, 8-byte memory size, then the file-backed bytes.
//! Zero-fill past the file bytes (`memsz > filesz`) is left to the device.

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::elf::{ElfError, ElfReader};
use crate::protocol::constants::SEGMENT_HEADER_SIZE;

/// Which program header address becomes the segment's load address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressField {
    /// `p_vaddr`
    Virtual,
    /// `p_paddr`
    Physical,
}

/// Encoding of the segment header fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
    /// Whatever the host uses.
    Native,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid value '{value}', expected one of: {expected}")]
pub struct ParseSettingError {
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for AddressField {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "virtual" | "virt" | "vaddr" => Ok(AddressField::Virtual),
            "physical" | "phys" | "paddr" => Ok(AddressField::Physical),
            _ => Err(ParseSettingError {
                value: s.to_string(),
                expected: "virtual, physical",
            }),
        }
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressField::Virtual => write!(f, "virtual"),
            AddressField::Physical => write!(f, "physical"),
        }
    }
}

impl FromStr for Endianness {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(Endianness::Little),
            "big" | "be" => Ok(Endianness::Big),
            "native" => Ok(Endianness::Native),
            _ => Err(ParseSettingError {
                value: s.to_string(),
                expected: "little, big, native",
            }),
        }
    }
}

impl Endianness {
    fn write_u64(self, buf: &mut [u8], value: u64) {
        match self {
            Endianness::Little => LittleEndian::write_u64(buf, value),
            Endianness::Big => BigEndian::write_u64(buf, value),
            Endianness::Native => NativeEndian::write_u64(buf, value),
        }
    }
}

/// A loadable segment with file-backed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'data> {
    pub load_address: u64,
    pub memory_size: u64,
    pub file_bytes: &'data [u8],
}

impl Segment<'_> {
    /// Header fields followed by the file bytes, no padding.
    pub fn encode(&self, order: Endianness) -> Vec<u8> {
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        order.write_u64(&mut header[..8], self.load_address);
        order.write_u64(&mut header[8..], self.memory_size);

        let mut out = Vec::with_capacity(SEGMENT_HEADER_SIZE + self.file_bytes.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(self.file_bytes);
        out
    }
}

/// Loadable, non-empty segments in program header order.
pub fn extract_segments<'data, R: ElfReader<'data>>(
    reader: &R,
    field: AddressField,
) -> Result<Vec<Segment<'data>>, ElfError> {
    let segments = reader
        .program_headers()?
        .into_iter()
        .enumerate()
        .filter_map(|(index, ph)| {
            if !ph.is_load() {
                return None;
            }
            if ph.file_bytes.is_empty() {
                debug!(index, mem_size = ph.mem_size, "Skipping PT_LOAD without file data");
                return None;
            }
            let load_address = match field {
                AddressField::Virtual => ph.virtual_address,
                AddressField::Physical => ph.physical_address,
            };
            Some(Segment {
                load_address,
                memory_size: ph.mem_size,
                file_bytes: ph.file_bytes,
            })
        })
        .collect();
    Ok(segments)
}
