//! Frame: one payload plus the command telling the device what to do with it.

use std::fmt;

use super::command::Command;
use super::constants::{REQ_ANNOUNCE_LENGTH, REQ_COMMAND, REQ_COMMIT, REQ_RESET};

/// Unit of transfer handed to the frame transporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
    command: Command,
    data_phase: bool,
}

impl Frame {
    /// Frame carrying data. Always runs the full exchange, even when
    /// `payload` is empty.
    pub fn new(payload: Vec<u8>, command: Command) -> Self {
        Self {
            payload,
            command,
            data_phase: true,
        }
    }

    /// Frame without a data phase: commit and command only.
    pub fn command_only(command: Command) -> Self {
        Self {
            payload: Vec::new(),
            command,
            data_phase: false,
        }
    }

    /// Terminal frame of every session.
    pub fn boot() -> Self {
        Self::command_only(Command::Boot)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether reset, announce length and bulk transfer precede the commit.
    pub fn has_data_phase(&self) -> bool {
        self.data_phase
    }
}

/// The five steps of a frame exchange, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    Reset,
    AnnounceLength,
    BulkTransfer,
    Commit,
    Command,
}

impl FrameStep {
    /// Control request code, `None` for the bulk phase.
    pub const fn request_code(self) -> Option<u8> {
        match self {
            FrameStep::Reset => Some(REQ_RESET),
            FrameStep::AnnounceLength => Some(REQ_ANNOUNCE_LENGTH),
            FrameStep::BulkTransfer => None,
            FrameStep::Commit => Some(REQ_COMMIT),
            FrameStep::Command => Some(REQ_COMMAND),
        }
    }

    /// 1-based position in the exchange.
    pub const fn number(self) -> u8 {
        match self {
            FrameStep::Reset => 1,
            FrameStep::AnnounceLength => 2,
            FrameStep::BulkTransfer => 3,
            FrameStep::Commit => 4,
            FrameStep::Command => 5,
        }
    }
}

impl fmt::Display for FrameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStep::Reset => write!(f, "Reset"),
            FrameStep::AnnounceLength => write!(f, "Announce Length"),
            FrameStep::BulkTransfer => write!(f, "Bulk Transfer"),
            FrameStep::Commit => write!(f, "Commit"),
            FrameStep::Command => write!(f, "Command"),
        }
    }
}

/// How a frame's command step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The device acknowledged the command.
    Acknowledged,
    /// The command transfer failed; the device left (e.g. after `booto`).
    DeviceDeparted { reason: String },
}

impl FrameOutcome {
    pub fn is_departed(&self) -> bool {
        matches!(self, FrameOutcome::DeviceDeparted { .. })
    }
}
