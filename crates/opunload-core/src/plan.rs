//! Upload plans: which artifacts go out, in which order, with which command.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::payload::{AddressField, Artifact, ArtifactError, ArtifactKind, Endianness};
use crate::protocol::{Command, Frame};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("No kernel specified")]
    MissingKernel,
}

/// The supported upload flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Kernel ELF segments only.
    KernelElf,
    /// Raw kernel image followed by a ramdisk.
    RawImage,
    /// Kernel ELF (physical addresses), device tree, optional ramdisk.
    KernelWithDeviceTree,
}

impl PlanKind {
    pub fn default_address_field(self) -> AddressField {
        match self {
            PlanKind::KernelElf | PlanKind::RawImage => AddressField::Virtual,
            PlanKind::KernelWithDeviceTree => AddressField::Physical,
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanKind::KernelElf => write!(f, "kernel ELF"),
            PlanKind::RawImage => write!(f, "raw image + ramdisk"),
            PlanKind::KernelWithDeviceTree => write!(f, "kernel ELF + device tree"),
        }
    }
}

/// One artifact source in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl PlanStep {
    pub fn command(&self) -> Command {
        self.kind.command()
    }
}

/// Ordered artifact list for one session, always ending in `booto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    kind: PlanKind,
    steps: Vec<PlanStep>,
    address_field: AddressField,
    dump_info: bool,
}

impl Plan {
    /// Pick the plan from the artifacts the caller supplied.
    ///
    /// - kernel only: ELF kernel
    /// - kernel + ramdisk: raw kernel image + ramdisk
    /// - kernel + devtree (+ ramdisk): ELF kernel at physical addresses
    pub fn select(
        kernel: Option<PathBuf>,
        devtree: Option<PathBuf>,
        ramdisk: Option<PathBuf>,
    ) -> Result<Self, PlanError> {
        let kernel = kernel.ok_or(PlanError::MissingKernel)?;

        let (kind, mut steps) = match (devtree, &ramdisk) {
            (Some(devtree), _) => (
                PlanKind::KernelWithDeviceTree,
                vec![
                    PlanStep {
                        kind: ArtifactKind::KernelElf,
                        path: kernel,
                    },
                    PlanStep {
                        kind: ArtifactKind::DeviceTree,
                        path: devtree,
                    },
                ],
            ),
            (None, Some(_)) => (
                PlanKind::RawImage,
                vec![PlanStep {
                    kind: ArtifactKind::RawImage,
                    path: kernel,
                }],
            ),
            (None, None) => (
                PlanKind::KernelElf,
                vec![PlanStep {
                    kind: ArtifactKind::KernelElf,
                    path: kernel,
                }],
            ),
        };

        if let Some(ramdisk) = ramdisk {
            steps.push(PlanStep {
                kind: ArtifactKind::Ramdisk,
                path: ramdisk,
            });
        }

        Ok(Self {
            kind,
            steps,
            address_field: kind.default_address_field(),
            dump_info: false,
        })
    }

    pub fn with_address_field(mut self, field: AddressField) -> Self {
        self.address_field = field;
        self
    }

    /// Send `dumpinfoo` before booting.
    pub fn with_dump_info(mut self, enabled: bool) -> Self {
        self.dump_info = enabled;
        self
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn address_field(&self) -> AddressField {
        self.address_field
    }

    pub fn dump_info(&self) -> bool {
        self.dump_info
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.steps.iter().map(|s| s.path.as_path())
    }
}

/// Frames for loaded artifacts, in order, followed by the boot frame.
pub fn build_frames(
    artifacts: &[Artifact],
    address_field: AddressField,
    order: Endianness,
    dump_info: bool,
) -> Result<Vec<Frame>, ArtifactError> {
    let mut frames = Vec::new();
    for artifact in artifacts {
        frames.extend(artifact.frames(address_field, order)?);
    }
    if dump_info {
        frames.push(Frame::command_only(Command::DumpInfo));
    }
    frames.push(Frame::boot());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Option<PathBuf> {
        Some(PathBuf::from(s))
    }

    fn kinds(plan: &Plan) -> Vec<ArtifactKind> {
        plan.steps().iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_missing_kernel() {
        assert_eq!(
            Plan::select(None, p("dt.bin"), p("rd.img")),
            Err(PlanError::MissingKernel)
        );
    }

    #[test]
    fn test_kernel_only_is_elf_plan() {
        let plan = Plan::select(p("kernel.elf"), None, None).unwrap();
        assert_eq!(plan.kind(), PlanKind::KernelElf);
        assert_eq!(kinds(&plan), vec![ArtifactKind::KernelElf]);
        assert_eq!(plan.address_field(), AddressField::Virtual);
    }

    #[test]
    fn test_kernel_and_ramdisk_is_raw_plan() {
        let plan = Plan::select(p("kernel.bin"), None, p("rd.img")).unwrap();
        assert_eq!(plan.kind(), PlanKind::RawImage);
        assert_eq!(
            kinds(&plan),
            vec![ArtifactKind::RawImage, ArtifactKind::Ramdisk]
        );
        let commands: Vec<Command> = plan.steps().iter().map(|s| s.command()).collect();
        assert_eq!(commands, vec![Command::RawImage, Command::Ramdisk]);
    }

    #[test]
    fn test_devtree_plan_uses_physical_addresses() {
        let plan = Plan::select(p("kernel.elf"), p("dt.bin"), p("rd.img")).unwrap();
        assert_eq!(plan.kind(), PlanKind::KernelWithDeviceTree);
        assert_eq!(
            kinds(&plan),
            vec![
                ArtifactKind::KernelElf,
                ArtifactKind::DeviceTree,
                ArtifactKind::Ramdisk
            ]
        );
        assert_eq!(plan.address_field(), AddressField::Physical);
    }

    #[test]
    fn test_devtree_without_ramdisk() {
        let plan = Plan::select(p("kernel.elf"), p("dt.bin"), None).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![ArtifactKind::KernelElf, ArtifactKind::DeviceTree]
        );
    }

    #[test]
    fn test_address_override() {
        let plan = Plan::select(p("kernel.elf"), p("dt.bin"), None)
            .unwrap()
            .with_address_field(AddressField::Virtual);
        assert_eq!(plan.address_field(), AddressField::Virtual);
    }

    #[test]
    fn test_build_frames_orders_and_terminates() {
        let artifacts = vec![
            Artifact::new(ArtifactKind::RawImage, vec![1; 2048]),
            Artifact::new(ArtifactKind::Ramdisk, vec![2; 512]),
        ];
        let frames =
            build_frames(&artifacts, AddressField::Virtual, Endianness::Little, true).unwrap();

        let summary: Vec<(Command, usize)> =
            frames.iter().map(|f| (f.command(), f.len())).collect();
        assert_eq!(
            summary,
            vec![
                (Command::RawImage, 2048),
                (Command::Ramdisk, 512),
                (Command::DumpInfo, 0),
                (Command::Boot, 0),
            ]
        );
    }
}
