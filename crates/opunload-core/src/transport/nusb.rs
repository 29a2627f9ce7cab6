//! nusb-based USB device implementation.

use std::io::Write;
use std::time::Duration;

use nusb::transfer::{Bulk, ControlOut, ControlType, Out, Recipient, TransferError};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbDevice};
use crate::protocol::constants::{CONTROL_TIMEOUT_MS, LOADER_INTERFACE};

/// nusb-backed loader device.
pub struct NusbDevice {
    interface: Interface,
    vid: u16,
    pid: u16,
    control_timeout: Duration,
}

impl NusbDevice {
    /// Open a device with specific VID/PID and activate its configuration.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // First configuration descriptor, as a default set_configuration() does.
        let configuration = device
            .configurations()
            .next()
            .map(|c| c.configuration_value())
            .unwrap_or(1);

        device
            .set_configuration(configuration)
            .wait()
            .map_err(|e| TransportError::ConfigurationFailed {
                configuration,
                message: e.to_string(),
            })?;
        debug!(configuration, "Configuration activated");

        let interface = device
            .claim_interface(LOADER_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: LOADER_INTERFACE,
                message: e.to_string(),
            })?;

        info!("Device opened successfully");

        Ok(Self {
            interface,
            vid,
            pid,
            control_timeout: Duration::from_millis(CONTROL_TIMEOUT_MS),
        })
    }

    /// Override the timeout applied to control transfers.
    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }
}

/// Split a raw OUT bmRequestType into nusb's typed fields.
fn split_request_type(request_type: u8) -> Result<(ControlType, Recipient), TransportError> {
    if request_type & 0x80 != 0 {
        return Err(TransportError::UnsupportedRequestType(request_type));
    }
    let control_type = match (request_type >> 5) & 0x03 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        2 => ControlType::Vendor,
        _ => return Err(TransportError::UnsupportedRequestType(request_type)),
    };
    let recipient = match request_type & 0x1F {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        3 => Recipient::Other,
        _ => return Err(TransportError::UnsupportedRequestType(request_type)),
    };
    Ok((control_type, recipient))
}

fn map_transfer_error(request: u8, err: TransferError) -> TransportError {
    match err {
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::ControlFailed {
            request,
            message: other.to_string(),
        },
    }
}

impl UsbDevice for NusbDevice {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        let (control_type, recipient) = split_request_type(request_type)?;

        self.interface
            .control_out(
                ControlOut {
                    control_type,
                    recipient,
                    request,
                    value,
                    index,
                    data,
                },
                self.control_timeout,
            )
            .wait()
            .map_err(|e| map_transfer_error(request, e))?;

        debug!(request, "Control transfer complete");
        Ok(data.len())
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(|e| TransportError::WriteFailed {
                endpoint,
                message: e.to_string(),
            })?;

        let mut writer = ep.writer(4096).with_write_timeout(timeout);
        writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed {
                endpoint,
                message: e.to_string(),
            })?;
        // An empty payload still goes out as a zero-length packet.
        let flushed = if data.is_empty() {
            writer.flush_end()
        } else {
            writer.flush()
        };
        flushed.map_err(|e| TransportError::WriteFailed {
            endpoint,
            message: e.to_string(),
        })?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
