//! Frame transporter: the control/bulk handshake for one frame.
//!
//! Wire sequence per frame (all control transfers use bmRequestType 0x21):
//!
//! 1. Reset (`REQ_RESET`, no data)
//! 2. Announce length (`REQ_ANNOUNCE_LENGTH`, u32 little-endian)
//! 3. Bulk write of the payload
//! 4. Commit (`REQ_COMMIT`, no data)
//! 5. Command (`REQ_COMMAND`, "<token>\n")
//!
//! Command-only frames ([`Frame::command_only`]) skip steps 1-3; a data
//! frame runs all five even when its payload is empty. A failure on steps 1-4 aborts;
//! a failure on step 5 means the device left and is reported as
//! [`FrameOutcome::DeviceDeparted`].

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::events::{UploadEvent, UploadObserver};
use crate::protocol::constants::{
    BULK_OUT_ENDPOINT, BULK_TIMEOUT_MS, LENGTH_FIELD_SIZE, REQUEST_TYPE_CLASS_INTERFACE_OUT,
};
use crate::protocol::{Command, Frame, FrameOutcome, FrameStep};
use crate::transport::{TransportError, UsbDevice};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{command}: {step} step failed: {source}")]
    Step {
        command: Command,
        step: FrameStep,
        #[source]
        source: TransportError,
    },
    #[error("{command}: payload of {len} bytes does not fit the 32-bit length field")]
    PayloadTooLarge { command: Command, len: usize },
}

impl FrameError {
    /// Step at which the frame failed, if it reached the device.
    pub fn step(&self) -> Option<FrameStep> {
        match self {
            FrameError::Step { step, .. } => Some(*step),
            FrameError::PayloadTooLarge { .. } => None,
        }
    }
}

/// Bulk endpoint and timeout used for the data phase.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub bulk_endpoint: u8,
    pub bulk_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            bulk_endpoint: BULK_OUT_ENDPOINT,
            bulk_timeout: Duration::from_millis(BULK_TIMEOUT_MS),
        }
    }
}

/// Length field for `REQ_ANNOUNCE_LENGTH`.
pub fn encode_length(len: u32) -> [u8; LENGTH_FIELD_SIZE] {
    let mut buf = [0u8; LENGTH_FIELD_SIZE];
    LittleEndian::write_u32(&mut buf, len);
    buf
}

/// Sends frames to one device, strictly one at a time.
pub struct FrameTransporter<'a, D: UsbDevice, O: UploadObserver> {
    device: &'a D,
    observer: &'a O,
    settings: TransferSettings,
}

impl<'a, D: UsbDevice, O: UploadObserver> FrameTransporter<'a, D, O> {
    pub fn new(device: &'a D, observer: &'a O, settings: TransferSettings) -> Self {
        Self {
            device,
            observer,
            settings,
        }
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<FrameOutcome, FrameError> {
        if frame.has_data_phase() {
            self.send(frame.payload(), frame.command())
        } else {
            self.send_command(frame.command())
        }
    }

    /// Full five-step exchange for `payload`, which may be empty.
    #[instrument(skip(self, payload), fields(command = %command, len = payload.len()))]
    pub fn send(&self, payload: &[u8], command: Command) -> Result<FrameOutcome, FrameError> {
        self.exchange(Some(payload), command)
    }

    /// Commit and command only.
    #[instrument(skip(self), fields(command = %command))]
    pub fn send_command(&self, command: Command) -> Result<FrameOutcome, FrameError> {
        self.exchange(None, command)
    }

    fn exchange(
        &self,
        payload: Option<&[u8]>,
        command: Command,
    ) -> Result<FrameOutcome, FrameError> {
        if let Some(payload) = payload {
            let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
                command,
                len: payload.len(),
            })?;

            self.control(command, FrameStep::Reset, &[])?;
            self.control(command, FrameStep::AnnounceLength, &encode_length(len))?;

            self.device
                .bulk_write(
                    self.settings.bulk_endpoint,
                    payload,
                    self.settings.bulk_timeout,
                )
                .map_err(|source| FrameError::Step {
                    command,
                    step: FrameStep::BulkTransfer,
                    source,
                })?;
            debug!(bytes = payload.len(), "Bulk phase complete");
            self.step_done(FrameStep::BulkTransfer);
        }

        self.control(command, FrameStep::Commit, &[])?;

        match self.raw_control(FrameStep::Command, &command.wire_bytes()) {
            Ok(_) => {
                self.step_done(FrameStep::Command);
                self.observer
                    .on_event(&UploadEvent::FrameAcknowledged { command });
                Ok(FrameOutcome::Acknowledged)
            }
            Err(err) => {
                info!(error = %err, "No acknowledgment for command, device departed");
                let reason = err.to_string();
                self.observer.on_event(&UploadEvent::DeviceDeparted {
                    command,
                    reason: reason.clone(),
                });
                Ok(FrameOutcome::DeviceDeparted { reason })
            }
        }
    }

    fn control(&self, command: Command, step: FrameStep, data: &[u8]) -> Result<(), FrameError> {
        self.raw_control(step, data)
            .map_err(|source| FrameError::Step {
                command,
                step,
                source,
            })?;
        self.step_done(step);
        Ok(())
    }

    fn raw_control(&self, step: FrameStep, data: &[u8]) -> Result<usize, TransportError> {
        // Every step except the bulk phase carries a request code.
        let request = step.request_code().unwrap_or_default();
        self.device
            .control_transfer(REQUEST_TYPE_CLASS_INTERFACE_OUT, request, 0, 0, data)
    }

    fn step_done(&self, step: FrameStep) {
        self.observer.on_event(&UploadEvent::StepCompleted { step });
    }
}
