//! Payload handling module.
//!
//! Turns input artifacts into the byte payloads carried by frames.

pub mod artifact;
pub mod segment;

pub use artifact::{Artifact, ArtifactError, ArtifactKind, extract_raw};
pub use segment::{AddressField, Endianness, ParseSettingError, Segment, extract_segments};
