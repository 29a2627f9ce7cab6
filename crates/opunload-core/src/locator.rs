//! Device locator: block until the loader shows up on the bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::events::{UploadEvent, UploadObserver};
use crate::transport::{NusbDevice, TransportError};

/// Longest single sleep, so cancellation is noticed promptly.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Cancelled while waiting for device")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Polls for a device by VID/PID with a fixed interval and no timeout.
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    vid: u16,
    pid: u16,
    poll_interval: Duration,
    cancel: Arc<AtomicBool>,
}

impl DeviceLocator {
    pub fn new(vid: u16, pid: u16, poll_interval: Duration) -> Self {
        Self {
            vid,
            pid,
            poll_interval,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag (e.g. set from a Ctrl+C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Wait for the device and open it with nusb.
    ///
    /// Opening activates the default configuration once.
    pub fn locate<O: UploadObserver>(&self, observer: &O) -> Result<NusbDevice, LocateError> {
        self.locate_with(NusbDevice::open_with_ids, observer)
    }

    /// Poll `open` until it stops reporting `DeviceNotFound`.
    ///
    /// The first miss prints a waiting notice; any other error is returned.
    #[instrument(skip(self, open, observer), fields(vid = %format!("{:04X}", self.vid), pid = %format!("{:04X}", self.pid)))]
    pub fn locate_with<D, F, O>(&self, mut open: F, observer: &O) -> Result<D, LocateError>
    where
        F: FnMut(u16, u16) -> Result<D, TransportError>,
        O: UploadObserver,
    {
        let start = Instant::now();
        let mut poll_count = 0u64;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(LocateError::Cancelled);
            }
            poll_count += 1;

            match open(self.vid, self.pid) {
                Ok(device) => {
                    info!(
                        polls = poll_count,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "Device found"
                    );
                    observer.on_event(&UploadEvent::DeviceConnected {
                        vid: self.vid,
                        pid: self.pid,
                    });
                    return Ok(device);
                }
                Err(TransportError::DeviceNotFound { .. }) => {
                    if poll_count == 1 {
                        println!("Waiting for device...");
                        observer.on_event(&UploadEvent::WaitingForDevice {
                            vid: self.vid,
                            pid: self.pid,
                        });
                    }
                    debug!(poll_count, "Device not present");
                    self.sleep_cancellable()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn sleep_cancellable(&self) -> Result<(), LocateError> {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(LocateError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(CANCEL_CHECK_INTERVAL));
        }
    }
}
