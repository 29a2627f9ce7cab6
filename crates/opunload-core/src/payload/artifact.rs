//! Artifacts: the files a session uploads, and the frames they turn into.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::segment::{AddressField, Endianness, extract_segments};
use crate::elf::{ElfError, ElfFile};
use crate::protocol::{Command, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    KernelElf,
    RawImage,
    DeviceTree,
    Ramdisk,
}

impl ArtifactKind {
    /// Command the device expects after receiving this kind of data.
    pub const fn command(self) -> Command {
        match self {
            ArtifactKind::KernelElf => Command::ElfSegment,
            ArtifactKind::RawImage => Command::RawImage,
            ArtifactKind::DeviceTree => Command::DeviceTree,
            ArtifactKind::Ramdisk => Command::Ramdisk,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::KernelElf => write!(f, "Kernel (ELF)"),
            ArtifactKind::RawImage => write!(f, "Kernel (raw image)"),
            ArtifactKind::DeviceTree => write!(f, "Device Tree"),
            ArtifactKind::Ramdisk => write!(f, "Ramdisk"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("{kind}: {source}")]
    Elf {
        kind: ArtifactKind,
        #[source]
        source: ElfError,
    },
}

/// An input file's bytes tagged with how to send them.
#[derive(Debug, Clone)]
pub struct Artifact {
    kind: ArtifactKind,
    bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frames for this artifact, in send order.
    pub fn frames(
        &self,
        field: AddressField,
        order: Endianness,
    ) -> Result<Vec<Frame>, ArtifactError> {
        match self.kind {
            ArtifactKind::KernelElf => {
                let to_err = |source| ArtifactError::Elf {
                    kind: self.kind,
                    source,
                };
                let elf = ElfFile::parse(&self.bytes).map_err(to_err)?;
                let segments = extract_segments(&elf, field).map_err(to_err)?;
                if segments.is_empty() {
                    warn!("Kernel ELF has no loadable segments with file data");
                }
                Ok(segments
                    .iter()
                    .map(|seg| {
                        debug!(
                            addr = %format!("0x{:X}", seg.load_address),
                            mem_size = %format!("0x{:X}", seg.memory_size),
                            file_size = seg.file_bytes.len(),
                            "PT_LOAD segment"
                        );
                        Frame::new(seg.encode(order), Command::ElfSegment)
                    })
                    .collect())
            }
            kind => {
                if self.bytes.is_empty() {
                    warn!(artifact = %kind, "Artifact is empty, announcing zero length");
                }
                Ok(vec![Frame::new(extract_raw(&self.bytes).to_vec(), kind.command())])
            }
        }
    }
}

/// Raw artifacts are sent as-is.
pub fn extract_raw(bytes: &[u8]) -> &[u8] {
    bytes
}
