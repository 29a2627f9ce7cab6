//! Event system for UI decoupling.
//!
//! Lets the CLI (or tests) follow an upload without tight coupling to the
//! protocol code.

use std::fmt;

use crate::protocol::{Command, FrameStep};

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Upload session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Building frames from the input files.
    Preparing,
    /// Waiting for device connection.
    WaitingForDevice,
    /// Sending artifact frames.
    Uploading,
    /// Sending the terminal boot frame.
    Booting,
    /// All frames sent.
    Complete,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadPhase::Preparing => write!(f, "Preparing"),
            UploadPhase::WaitingForDevice => write!(f, "Waiting for Device"),
            UploadPhase::Uploading => write!(f, "Uploading"),
            UploadPhase::Booting => write!(f, "Booting"),
            UploadPhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Events emitted during an upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// First enumeration attempt found nothing; polling continues.
    WaitingForDevice { vid: u16, pid: u16 },
    /// Device found and configured.
    DeviceConnected { vid: u16, pid: u16 },
    /// Phase changed.
    PhaseChanged { from: UploadPhase, to: UploadPhase },
    /// A frame is about to be sent.
    FrameStarted {
        index: usize,
        total: usize,
        command: Command,
        len: usize,
    },
    /// One handshake step finished.
    StepCompleted { step: FrameStep },
    /// The device acknowledged a command.
    FrameAcknowledged { command: Command },
    /// The device dropped off instead of acknowledging a command.
    DeviceDeparted { command: Command, reason: String },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// All frames sent.
    Complete,
}

/// Observer trait for receiving upload events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait UploadObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &UploadEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UploadObserver for NullObserver {
    fn on_event(&self, _event: &UploadEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn on_event(&self, event: &UploadEvent) {
        match event {
            UploadEvent::WaitingForDevice { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Waiting for device");
            }
            UploadEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            UploadEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            UploadEvent::FrameStarted {
                index,
                total,
                command,
                len,
            } => {
                tracing::info!(
                    frame = %format!("{}/{}", index + 1, total),
                    command = %command,
                    len = len,
                    "Sending frame"
                );
            }
            UploadEvent::StepCompleted { step } => {
                tracing::trace!(step = %step, n = step.number(), "Step complete");
            }
            UploadEvent::FrameAcknowledged { command } => {
                tracing::debug!(command = %command, "Command acknowledged");
            }
            UploadEvent::DeviceDeparted { command, reason } => {
                tracing::info!(command = %command, reason = %reason, "Device left without acknowledging");
            }
            UploadEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            UploadEvent::Complete => {
                tracing::info!("Upload complete");
            }
        }
    }
}
