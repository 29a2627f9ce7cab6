//! Mock USB device for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{TransportError, UsbDevice};
use crate::protocol::constants::{LOADER_PRODUCT_ID, LOADER_VENDOR_ID, REQ_ANNOUNCE_LENGTH, REQ_COMMAND};

/// One recorded USB operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbOp {
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    Bulk {
        endpoint: u8,
        data: Vec<u8>,
        timeout: Duration,
    },
}

#[derive(Default)]
struct MockState {
    /// Every attempted operation, including failed ones.
    ops: Vec<UsbOp>,
    /// Seen count per control request code.
    control_counts: HashMap<u8, usize>,
    bulk_count: usize,
    /// (request, nth) pairs that fail.
    control_failures: Vec<(u8, usize)>,
    bulk_failures: Vec<usize>,
    /// Command token after which the device drops off the bus.
    depart_on: Option<String>,
    connected: bool,
}

/// Mock device recording every transfer, with scriptable failures.
pub struct MockDevice {
    state: Mutex<MockState>,
    vid: u16,
    pid: u16,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                connected: true,
                ..Default::default()
            }),
            vid: LOADER_VENDOR_ID,
            pid: LOADER_PRODUCT_ID,
        }
    }

    /// Fail the `nth` (1-based) control transfer carrying `request`.
    pub fn fail_control(&self, request: u8, nth: usize) {
        self.state.lock().unwrap().control_failures.push((request, nth));
    }

    /// Fail the `nth` (1-based) bulk write.
    pub fn fail_bulk(&self, nth: usize) {
        self.state.lock().unwrap().bulk_failures.push(nth);
    }

    /// Disconnect while executing `token` instead of acknowledging it.
    pub fn depart_on(&self, token: &str) {
        self.state.lock().unwrap().depart_on = Some(token.to_string());
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Get all attempted operations.
    pub fn ops(&self) -> Vec<UsbOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Command tokens sent with `REQ_COMMAND`, newline stripped.
    pub fn commands(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                UsbOp::Control { request, data, .. } if request == REQ_COMMAND => Some(
                    String::from_utf8_lossy(&data)
                        .trim_end_matches('\n')
                        .to_string(),
                ),
                _ => None,
            })
            .collect()
    }

    /// Payloads of all bulk writes.
    pub fn bulk_writes(&self) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                UsbOp::Bulk { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    /// Raw length fields sent with `REQ_ANNOUNCE_LENGTH`.
    pub fn announced_lengths(&self) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                UsbOp::Control { request, data, .. } if request == REQ_ANNOUNCE_LENGTH => {
                    Some(data)
                }
                _ => None,
            })
            .collect()
    }

    /// Control request codes in the order they were issued.
    pub fn control_requests(&self) -> Vec<u8> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                UsbOp::Control { request, .. } => Some(request),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbDevice for MockDevice {
    fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.ops.push(UsbOp::Control {
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        });

        let count = state.control_counts.entry(request).or_insert(0);
        *count += 1;
        let nth = *count;
        if state.control_failures.contains(&(request, nth)) {
            return Err(TransportError::ControlFailed {
                request,
                message: "pipe error".into(),
            });
        }

        if request == REQ_COMMAND
            && let Some(token) = &state.depart_on
            && data.strip_suffix(b"\n") == Some(token.as_bytes())
        {
            state.connected = false;
            return Err(TransportError::Disconnected);
        }

        Ok(data.len())
    }

    fn bulk_write(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.ops.push(UsbOp::Bulk {
            endpoint,
            data: data.to_vec(),
            timeout,
        });
        state.bulk_count += 1;
        let nth = state.bulk_count;
        if state.bulk_failures.contains(&nth) {
            return Err(TransportError::WriteFailed {
                endpoint,
                message: "timed out".into(),
            });
        }
        Ok(data.len())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
