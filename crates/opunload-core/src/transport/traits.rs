//! USB Transport layer abstraction.
//!
//! Defines the `UsbDevice` trait for USB communication,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to set configuration {configuration}: {message}")]
    ConfigurationFailed { configuration: u8, message: String },

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Unsupported request type 0x{0:02X}")]
    UnsupportedRequestType(u8),

    #[error("Control request {request} failed: {message}")]
    ControlFailed { request: u8, message: String },

    #[error("Bulk write to endpoint 0x{endpoint:02X} failed: {message}")]
    WriteFailed { endpoint: u8, message: String },

    #[error("Device disconnected")]
    Disconnected,
}

/// Abstract USB device interface.
///
/// This trait enables:
/// - Production implementation using nusb
/// - Mock implementation for unit testing
pub trait UsbDevice: Send + Sync {
    /// Issue an OUT control transfer with the raw setup fields.
    fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError>;

    /// Write `data` to a bulk OUT endpoint.
    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
