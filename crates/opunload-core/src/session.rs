//! Upload session - high-level orchestrator for one upload.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::events::{LogLevel, TracingObserver, UploadEvent, UploadObserver, UploadPhase};
use crate::locator::DeviceLocator;
use crate::payload::{AddressField, Artifact, Endianness};
use crate::plan::{Plan, build_frames};
use crate::protocol::constants::{
    BULK_OUT_ENDPOINT, BULK_TIMEOUT_MS, CONTROL_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    LOADER_PRODUCT_ID, LOADER_VENDOR_ID,
};
use crate::protocol::{Command, Frame, FrameOutcome};
use crate::transport::UsbDevice;
use crate::transporter::{FrameTransporter, TransferSettings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write config: {0}")]
    Write(#[from] std::io::Error),
}

/// Configuration for an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// USB vendor ID to wait for.
    pub vendor_id: u16,
    /// USB product ID to wait for.
    pub product_id: u16,
    /// Delay between enumeration attempts.
    pub poll_interval_ms: u64,
    /// Bulk OUT endpoint address.
    pub bulk_endpoint: u8,
    /// Bulk write timeout.
    pub bulk_timeout_ms: u64,
    /// Control transfer timeout.
    pub control_timeout_ms: u64,
    /// Overrides the plan's address field when set.
    pub address_field: Option<AddressField>,
    /// Encoding of the segment address/size fields.
    pub byte_order: Endianness,
    /// Send `dumpinfoo` before booting.
    pub dump_info: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vendor_id: LOADER_VENDOR_ID,
            product_id: LOADER_PRODUCT_ID,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            bulk_endpoint: BULK_OUT_ENDPOINT,
            bulk_timeout_ms: BULK_TIMEOUT_MS,
            control_timeout_ms: CONTROL_TIMEOUT_MS,
            address_field: None,
            byte_order: Endianness::default(),
            dump_info: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            bulk_endpoint: self.bulk_endpoint,
            bulk_timeout: Duration::from_millis(self.bulk_timeout_ms),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_sent: usize,
    pub bytes_sent: u64,
    /// Outcome of the terminal boot frame, `None` if no `booto` was sent.
    pub boot_outcome: Option<FrameOutcome>,
}

/// Upload session - runs one plan against one device.
pub struct UploadSession<O: UploadObserver> {
    config: SessionConfig,
    plan: Plan,
    observer: Arc<O>,
    cancel: Arc<AtomicBool>,
}

impl UploadSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig, plan: Plan) -> Self {
        Self::with_observer(config, plan, Arc::new(TracingObserver))
    }
}

impl<O: UploadObserver> UploadSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, plan: Plan, observer: Arc<O>) -> Self {
        let plan = match config.address_field {
            Some(field) => plan.with_address_field(field),
            None => plan,
        };
        let dump_info = plan.dump_info() || config.dump_info;
        Self {
            plan: plan.with_dump_info(dump_info),
            config,
            observer,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts the device wait when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Read every artifact and build the full frame list.
    ///
    /// Runs before any device interaction so bad input fails early.
    pub fn prepare(&self) -> Result<Vec<Frame>> {
        let mut artifacts = Vec::with_capacity(self.plan.steps().len());
        for step in self.plan.steps() {
            info!(artifact = %step.kind, path = %step.path.display(), "Loading");
            let bytes = std::fs::read(&step.path)
                .with_context(|| format!("Failed to read {}", step.path.display()))?;
            self.observer.on_event(&UploadEvent::Log {
                level: LogLevel::Debug,
                message: format!("{}: {} bytes", step.kind, bytes.len()),
            });
            artifacts.push(Artifact::new(step.kind, bytes));
        }

        let frames = build_frames(
            &artifacts,
            self.plan.address_field(),
            self.config.byte_order,
            self.plan.dump_info(),
        )?;
        info!(
            plan = %self.plan.kind(),
            address_field = %self.plan.address_field(),
            frames = frames.len(),
            "Plan prepared"
        );
        Ok(frames)
    }

    /// Run the complete session: prepare, wait for device, send, boot.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<SessionReport> {
        let frames = self.prepare()?;

        self.phase(UploadPhase::Preparing, UploadPhase::WaitingForDevice);
        let device = DeviceLocator::new(
            self.config.vendor_id,
            self.config.product_id,
            Duration::from_millis(self.config.poll_interval_ms),
        )
        .with_cancel_flag(self.cancel.clone())
        .locate(self.observer.as_ref())?
        .with_control_timeout(Duration::from_millis(self.config.control_timeout_ms));

        self.run_on(&device, &frames)
    }

    /// Send `frames` in order over an already-open device.
    pub fn run_on<D: UsbDevice>(&self, device: &D, frames: &[Frame]) -> Result<SessionReport> {
        let transporter = FrameTransporter::new(
            device,
            self.observer.as_ref(),
            self.config.transfer_settings(),
        );

        self.phase(UploadPhase::WaitingForDevice, UploadPhase::Uploading);

        let total = frames.len();
        let mut bytes_sent = 0u64;
        let mut boot_outcome = None;
        for (index, frame) in frames.iter().enumerate() {
            if frame.command() == Command::Boot {
                self.phase(UploadPhase::Uploading, UploadPhase::Booting);
            }
            self.observer.on_event(&UploadEvent::FrameStarted {
                index,
                total,
                command: frame.command(),
                len: frame.len(),
            });

            let outcome = transporter.send_frame(frame)?;
            bytes_sent += frame.len() as u64;

            if frame.command() == Command::Boot {
                boot_outcome = Some(outcome);
            }
        }

        self.phase(UploadPhase::Booting, UploadPhase::Complete);
        self.observer.on_event(&UploadEvent::Complete);

        Ok(SessionReport {
            frames_sent: total,
            bytes_sent,
            boot_outcome,
        })
    }

    fn phase(&self, from: UploadPhase, to: UploadPhase) {
        self.observer
            .on_event(&UploadEvent::PhaseChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::PT_LOAD;
    use crate::events::recording::RecordingObserver;
    use crate::payload::ArtifactKind;
    use crate::protocol::constants::{REQ_ANNOUNCE_LENGTH, REQ_RESET, SEGMENT_HEADER_SIZE};
    use crate::testutil::ElfBuilder;
    use crate::transport::MockDevice;
    use crate::transporter::FrameError;
    use std::path::PathBuf;

    fn session(plan: Plan) -> UploadSession<RecordingObserver> {
        UploadSession::with_observer(
            SessionConfig::default(),
            plan,
            Arc::new(RecordingObserver::default()),
        )
    }

    fn dummy_plan() -> Plan {
        Plan::select(Some(PathBuf::from("kernel.elf")), None, None).unwrap()
    }

    #[test]
    fn test_elf_plan_end_to_end() {
        let elf = ElfBuilder::elf64()
            .segment(PT_LOAD, 0x1000, 0x1000, 4096, &[0x11; 4096])
            .segment(PT_LOAD, 0x9000, 0x9000, 128, &[0x22; 128])
            .build();
        let frames = build_frames(
            &[Artifact::new(ArtifactKind::KernelElf, elf)],
            AddressField::Virtual,
            Endianness::Little,
            false,
        )
        .unwrap();

        let mock = MockDevice::new();
        mock.depart_on("booto");
        let report = session(dummy_plan()).run_on(&mock, &frames).unwrap();

        assert_eq!(mock.commands(), vec!["elfsego", "elfsego", "booto"]);
        let writes = mock.bulk_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), SEGMENT_HEADER_SIZE + 4096);
        assert_eq!(&writes[0][..8], &0x1000u64.to_le_bytes());
        assert_eq!(&writes[0][8..16], &4096u64.to_le_bytes());
        assert_eq!(writes[1].len(), SEGMENT_HEADER_SIZE + 128);
        assert_eq!(&writes[1][..8], &0x9000u64.to_le_bytes());

        assert_eq!(report.frames_sent, 3);
        assert!(report.boot_outcome.unwrap().is_departed());
    }

    #[test]
    fn test_raw_plan_end_to_end() {
        let frames = build_frames(
            &[
                Artifact::new(ArtifactKind::RawImage, vec![0xAA; 2048]),
                Artifact::new(ArtifactKind::Ramdisk, vec![0xBB; 512]),
            ],
            AddressField::Virtual,
            Endianness::Little,
            false,
        )
        .unwrap();

        let mock = MockDevice::new();
        let report = session(dummy_plan()).run_on(&mock, &frames).unwrap();

        assert_eq!(mock.commands(), vec!["rawimgo", "ramdisko", "booto"]);
        let lengths: Vec<usize> = mock.bulk_writes().iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![2048, 512]);
        assert_eq!(
            mock.announced_lengths(),
            vec![2048u32.to_le_bytes().to_vec(), 512u32.to_le_bytes().to_vec()]
        );
        assert_eq!(report.bytes_sent, 2560);
        assert_eq!(report.boot_outcome, Some(FrameOutcome::Acknowledged));
    }

    #[test]
    fn test_raw_plan_with_empty_ramdisk() {
        let frames = build_frames(
            &[
                Artifact::new(ArtifactKind::RawImage, vec![0xAA; 2048]),
                Artifact::new(ArtifactKind::Ramdisk, Vec::new()),
            ],
            AddressField::Virtual,
            Endianness::Little,
            false,
        )
        .unwrap();

        let mock = MockDevice::new();
        session(dummy_plan()).run_on(&mock, &frames).unwrap();

        assert_eq!(
            mock.control_requests(),
            vec![2, 1, 4, 3, 2, 1, 4, 3, 4, 3]
        );
        assert_eq!(
            mock.announced_lengths(),
            vec![2048u32.to_le_bytes().to_vec(), vec![0, 0, 0, 0]]
        );
        let lengths: Vec<usize> = mock.bulk_writes().iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![2048, 0]);
        assert_eq!(mock.commands(), vec!["rawimgo", "ramdisko", "booto"]);
    }

    #[test]
    fn test_frames_without_boot_report_no_boot_outcome() {
        let frames = [Frame::new(vec![1; 32], Command::DeviceTree)];

        let mock = MockDevice::new();
        let report = session(dummy_plan()).run_on(&mock, &frames).unwrap();

        assert_eq!(report.frames_sent, 1);
        assert_eq!(report.boot_outcome, None);
    }

    #[test]
    fn test_devtree_plan_order() {
        let elf = ElfBuilder::elf64()
            .segment(PT_LOAD, 0x4000_0000, 0x0080_0000, 0x100, &[1; 0x80])
            .build();
        let frames = build_frames(
            &[
                Artifact::new(ArtifactKind::KernelElf, elf),
                Artifact::new(ArtifactKind::DeviceTree, vec![3; 64]),
                Artifact::new(ArtifactKind::Ramdisk, vec![4; 32]),
            ],
            AddressField::Physical,
            Endianness::Little,
            false,
        )
        .unwrap();

        let mock = MockDevice::new();
        session(dummy_plan()).run_on(&mock, &frames).unwrap();

        assert_eq!(
            mock.commands(),
            vec!["elfsego", "devtreeo", "ramdisko", "booto"]
        );
        assert_eq!(&mock.bulk_writes()[0][..8], &0x0080_0000u64.to_le_bytes());
    }

    #[test]
    fn test_step_failure_aborts_session() {
        let frames = build_frames(
            &[
                Artifact::new(ArtifactKind::RawImage, vec![0; 16]),
                Artifact::new(ArtifactKind::Ramdisk, vec![0; 16]),
            ],
            AddressField::Virtual,
            Endianness::Little,
            false,
        )
        .unwrap();

        let mock = MockDevice::new();
        mock.fail_control(REQ_ANNOUNCE_LENGTH, 2);
        let err = session(dummy_plan()).run_on(&mock, &frames).unwrap_err();

        let frame_err = err.downcast_ref::<FrameError>().unwrap();
        assert_eq!(
            frame_err.step(),
            Some(crate::protocol::FrameStep::AnnounceLength)
        );
        // Ramdisk never committed, boot never sent.
        assert_eq!(mock.commands(), vec!["rawimgo"]);
    }

    #[test]
    fn test_mid_plan_departure_then_reset_failure_aborts() {
        let frames = build_frames(
            &[
                Artifact::new(ArtifactKind::RawImage, vec![0; 16]),
                Artifact::new(ArtifactKind::Ramdisk, vec![0; 16]),
            ],
            AddressField::Virtual,
            Endianness::Little,
            false,
        )
        .unwrap();

        let mock = MockDevice::new();
        mock.depart_on("rawimgo");
        let err = session(dummy_plan()).run_on(&mock, &frames).unwrap_err();
        let frame_err = err.downcast_ref::<FrameError>().unwrap();
        assert_eq!(frame_err.step(), Some(crate::protocol::FrameStep::Reset));
        assert_eq!(
            mock.control_requests().iter().filter(|r| **r == REQ_RESET).count(),
            1
        );
    }

    #[test]
    fn test_events_follow_frames() {
        let frames = vec![Frame::new(vec![1; 4], Command::Ramdisk), Frame::boot()];
        let mock = MockDevice::new();
        mock.depart_on("booto");
        let session = session(dummy_plan());
        session.run_on(&mock, &frames).unwrap();

        let events = session.observer.events();
        let started: Vec<Command> = events
            .iter()
            .filter_map(|e| match e {
                UploadEvent::FrameStarted { command, .. } => Some(*command),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![Command::Ramdisk, Command::Boot]);
        assert!(events.contains(&UploadEvent::FrameAcknowledged {
            command: Command::Ramdisk
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            UploadEvent::DeviceDeparted {
                command: Command::Boot,
                ..
            }
        )));
        assert_eq!(events.last(), Some(&UploadEvent::Complete));
    }

    #[test]
    fn test_prepare_reads_files_in_plan_order() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = dir.path().join("kernel.bin");
        let ramdisk = dir.path().join("ramdisk.img");
        std::fs::write(&kernel, vec![0x42; 2048]).unwrap();
        std::fs::write(&ramdisk, vec![0x24; 512]).unwrap();

        let plan = Plan::select(Some(kernel), None, Some(ramdisk)).unwrap();
        let frames = session(plan).prepare().unwrap();

        let summary: Vec<(Command, usize)> =
            frames.iter().map(|f| (f.command(), f.len())).collect();
        assert_eq!(
            summary,
            vec![
                (Command::RawImage, 2048),
                (Command::Ramdisk, 512),
                (Command::Boot, 0)
            ]
        );
    }

    #[test]
    fn test_prepare_missing_file_names_path() {
        let plan = Plan::select(Some(PathBuf::from("/nonexistent/kernel.elf")), None, None)
            .unwrap();
        let err = session(plan).prepare().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/kernel.elf"));
    }

    #[test]
    fn test_config_overrides_plan() {
        let config = SessionConfig {
            address_field: Some(AddressField::Physical),
            dump_info: true,
            ..Default::default()
        };
        let session = UploadSession::with_observer(
            config,
            dummy_plan(),
            Arc::new(RecordingObserver::default()),
        );
        assert_eq!(session.plan().address_field(), AddressField::Physical);
        assert!(session.plan().dump_info());
    }

    #[test]
    fn test_config_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opunload.toml");
        let config = SessionConfig {
            poll_interval_ms: 500,
            byte_order: Endianness::Big,
            address_field: Some(AddressField::Virtual),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SessionConfig = toml::from_str("poll_interval_ms = 250\n").unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.vendor_id, LOADER_VENDOR_ID);
        assert_eq!(config.product_id, LOADER_PRODUCT_ID);
        assert_eq!(config.byte_order, Endianness::Little);
        assert_eq!(config.address_field, None);
    }
}
