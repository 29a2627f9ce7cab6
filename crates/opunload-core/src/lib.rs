//! opunload-core: host side of the opuntiaOS USB boot protocol.
//!
//! Uploads a kernel (ELF segments or a raw image), an optional device tree
//! and an optional ramdisk to a device sitting in the pongoOS-based loader,
//! then tells it to boot.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, command tokens, frame types
//! - **Transport**: USB device abstraction (nusb, mock)
//! - **ELF / Payload**: Program header reader, segment and artifact extraction
//! - **Transporter**: The per-frame control/bulk handshake
//! - **Locator**: Waiting for the device to enumerate
//! - **Plan / Session**: Which frames to send, and the orchestrator
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use opunload_core::plan::Plan;
//! use opunload_core::session::{SessionConfig, UploadSession};
//!
//! let plan = Plan::select(Some("kernel.elf".into()), None, None).unwrap();
//! let session = UploadSession::new(SessionConfig::default(), plan);
//! session.run().expect("upload failed");
//! ```

pub mod elf;
pub mod events;
pub mod locator;
pub mod payload;
pub mod plan;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transporter;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenience
pub use elf::{ElfError, ElfFile, ElfReader, ProgramHeader};
pub use events::{LogLevel, NullObserver, TracingObserver, UploadEvent, UploadObserver, UploadPhase};
pub use locator::{DeviceLocator, LocateError};
pub use payload::{AddressField, Artifact, ArtifactKind, Endianness, Segment, extract_segments};
pub use plan::{Plan, PlanError, PlanKind, build_frames};
pub use protocol::{Command, Frame, FrameOutcome, FrameStep};
pub use session::{ConfigError, SessionConfig, SessionReport, UploadSession};
pub use transport::{MockDevice, NusbDevice, TransportError, UsbDevice};
pub use transporter::{FrameError, FrameTransporter, TransferSettings};
