//! Shell command tokens understood by the device-side loader.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A command sent in the final step of a frame.
///
/// The token set is fixed by the device firmware; each token is registered
/// as a shell command on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Copy the received buffer (address + size header + bytes) into RAM.
    ElfSegment,
    /// Treat the received buffer as the whole raw kernel image.
    RawImage,
    /// Keep the received buffer as the device tree blob.
    DeviceTree,
    /// Map the received buffer as the ramdisk.
    Ramdisk,
    /// Dump page-table diagnostics on the device console.
    DumpInfo,
    /// Leave the loader and jump to the kernel.
    Boot,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown loader command: {0}")]
pub struct UnknownCommand(pub String);

impl Command {
    pub const ALL: [Command; 6] = [
        Command::ElfSegment,
        Command::RawImage,
        Command::DeviceTree,
        Command::Ramdisk,
        Command::DumpInfo,
        Command::Boot,
    ];

    /// Token as registered on the device.
    pub const fn token(self) -> &'static str {
        match self {
            Command::ElfSegment => "elfsego",
            Command::RawImage => "rawimgo",
            Command::DeviceTree => "devtreeo",
            Command::Ramdisk => "ramdisko",
            Command::DumpInfo => "dumpinfoo",
            Command::Boot => "booto",
        }
    }

    /// ASCII bytes sent with `REQ_COMMAND`: token followed by `\n`.
    pub fn wire_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.token().len() + 1);
        bytes.extend_from_slice(self.token().as_bytes());
        bytes.push(b'\n');
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim_end_matches('\n');
        Command::ALL
            .into_iter()
            .find(|c| c.token() == token)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
