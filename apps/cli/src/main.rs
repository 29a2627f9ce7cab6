use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use opunload_core::payload::{AddressField, Endianness};
use opunload_core::plan::{Plan, PlanError};
use opunload_core::protocol::FrameOutcome;
use opunload_core::session::{SessionConfig, UploadSession};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload and boot opuntiaOS over the pongoOS USB loader", long_about = None)]
struct Args {
    /// Path to kernel image (ELF, or raw image when a ramdisk is given without a device tree)
    #[arg(short, long)]
    kernel: Option<PathBuf>,

    /// Path to ramdisk to upload
    #[arg(short, long)]
    ramdisk: Option<PathBuf>,

    /// Path to device tree blob to upload
    #[arg(short, long)]
    devtree: Option<PathBuf>,

    /// TOML session config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delay between device enumeration attempts
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// ELF address used as load address (virtual | physical)
    #[arg(long)]
    address_field: Option<AddressField>,

    /// Encoding of segment address/size fields (little | big | native)
    #[arg(long)]
    byte_order: Option<Endianness>,

    /// Ask the loader to dump diagnostics before booting
    #[arg(long)]
    dump_info: bool,

    /// Build and list frames without touching a device
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let plan = match Plan::select(args.kernel.clone(), args.devtree.clone(), args.ramdisk.clone()) {
        Ok(plan) => plan,
        Err(PlanError::MissingKernel) => {
            let program = std::env::args().next().unwrap_or_else(|| "opunload".into());
            println!("error: No kernel specified! Run `{program} --help` for usage.");
            std::process::exit(1);
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args, plan) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(field) = args.address_field {
        config.address_field = Some(field);
    }
    if let Some(order) = args.byte_order {
        config.byte_order = order;
    }
    config.dump_info |= args.dump_info;
    Ok(config)
}

fn run(args: &Args, plan: Plan) -> Result<()> {
    let config = load_config(args)?;
    info!(plan = %plan.kind(), "Starting opunload (nusb backend)...");

    let session = UploadSession::new(config, plan);

    if args.dry_run {
        let frames = session.prepare()?;
        for (i, frame) in frames.iter().enumerate() {
            info!(
                frame = i + 1,
                command = %frame.command(),
                len = frame.len(),
                "Dry run"
            );
        }
        return Ok(());
    }

    let cancel = session.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "Could not install Ctrl+C handler");
    }

    let report = session.run()?;
    match report.boot_outcome {
        Some(FrameOutcome::DeviceDeparted { .. }) => println!("Success."),
        Some(FrameOutcome::Acknowledged) => println!("Boot command acknowledged."),
        None => warn!("Session ended without a boot command"),
    }
    info!(
        frames = report.frames_sent,
        bytes = report.bytes_sent,
        "Session finished"
    );
    Ok(())
}
