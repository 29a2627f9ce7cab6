//! Protocol module - loader wire protocol definitions.

pub mod command;
pub mod constants;
pub mod frame;

pub use command::{Command, UnknownCommand};
pub use constants::*;
pub use frame::{Frame, FrameOutcome, FrameStep};
