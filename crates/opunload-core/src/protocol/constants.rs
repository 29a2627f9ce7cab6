//! Protocol constants for the opuntiaOS USB loader.
//!
//! The device side is a pongoOS-derived second-stage bootloader that
//! enumerates with Apple's vendor ID and exposes one bulk OUT endpoint plus
//! class requests on interface 0.

// ============================================================================
// Device Identification
// ============================================================================

/// Apple Inc. vendor ID, reused by the bootloader.
pub const LOADER_VENDOR_ID: u16 = 0x05AC;

/// Product ID the bootloader enumerates with.
pub const LOADER_PRODUCT_ID: u16 = 0x4141;

/// Interface all class requests are addressed to.
pub const LOADER_INTERFACE: u8 = 0;

// ============================================================================
// Control Requests (Host -> Device)
// ============================================================================

/// bmRequestType: host-to-device | class | interface.
pub const REQUEST_TYPE_CLASS_INTERFACE_OUT: u8 = 0x21;

/// Set the expected byte count of the next bulk phase.
pub const REQ_ANNOUNCE_LENGTH: u8 = 1;

/// Clear the device receive buffer.
pub const REQ_RESET: u8 = 2;

/// Execute a newline-terminated shell command.
pub const REQ_COMMAND: u8 = 3;

/// Bulk data complete, hand the buffer to the shell.
pub const REQ_COMMIT: u8 = 4;

// ============================================================================
// Bulk Transfer
// ============================================================================

/// Bulk OUT endpoint carrying frame payloads.
pub const BULK_OUT_ENDPOINT: u8 = 0x02;

/// Bulk write timeout. Large images plus slow device-side copies.
pub const BULK_TIMEOUT_MS: u64 = 1_000_000;

/// Control transfer timeout. Effectively unbounded; a hung device blocks.
pub const CONTROL_TIMEOUT_MS: u64 = 1_000_000;

// ============================================================================
// Device Discovery
// ============================================================================

/// Delay between enumeration attempts while waiting for the device.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

// ============================================================================
// Payload Layout
// ============================================================================

/// ELF segment payload header: 8-byte address + 8-byte memory size.
pub const SEGMENT_HEADER_SIZE: usize = 16;

/// Size of the length field sent with `REQ_ANNOUNCE_LENGTH`.
pub const LENGTH_FIELD_SIZE: usize = 4;
