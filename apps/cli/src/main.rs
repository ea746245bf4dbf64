use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use fbflash_core::archive::ZipBlobArchive;
use fbflash_core::events::{FlashEvent, FlashObserver, ProgressAction};
use fbflash_core::executor::{FlashConfig, FlashExecutor};
use fbflash_core::plan::FlashPlan;
use fbflash_core::transport::{TransportError, UsbSession};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "fbflash",
    author,
    version,
    about = "Fastboot factory-image flasher (Pure Rust)",
    long_about = "Flashes an optimized factory zip archive to an Android device in fastboot mode, streaming partition images straight from the archive."
)]
struct Args {
    /// Path to the factory archive (zip); may also come from --config
    archive: Option<PathBuf>,

    /// Erase userdata and other wiped partitions
    #[arg(long)]
    wipe: bool,

    /// Only flash the device with this serial number
    #[arg(long)]
    serial: Option<String>,

    /// Load defaults from a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the device to (re)appear
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// CLI observer that prints progress to stderr.
struct CliObserver {
    verbose: bool,
}

impl FlashObserver for CliObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::CommandStarted { index, keyword } => {
                if self.verbose {
                    eprintln!("→ [{index}] {keyword}");
                }
            }
            FlashEvent::Progress {
                action,
                item,
                overall,
            } => {
                let pct = (overall * 100.0) as u32;
                match action {
                    ProgressAction::Flash => {
                        eprint!("\r[{pct:>3}%] flash: {item}");
                        if *overall >= 1.0 {
                            eprintln!();
                        }
                    }
                    _ => eprintln!("[{pct:>3}%] {action}: {item}"),
                }
            }
            FlashEvent::Complete => {
                eprintln!("✓ Flash complete!");
            }
        }
    }
}

fn wait_for_device(
    serial: Option<&str>,
    timeout: Duration,
) -> Result<UsbSession, TransportError> {
    info!("Waiting for fastboot device...");
    let start = Instant::now();
    loop {
        let attempt = match serial {
            Some(serial) => UsbSession::open_with_serial(serial),
            None => UsbSession::open(),
        };
        match attempt {
            Ok(session) => {
                info!(serial = session.serial().unwrap_or("-"), "Device found");
                return Ok(session);
            }
            Err(TransportError::DeviceNotFound) => {
                if start.elapsed() > timeout {
                    return Err(TransportError::DeviceNotFound);
                }
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(e),
        }
    }
}

fn main() {
    let args = Args::parse();

    // Initialize tracing subscriber
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::WARN.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = match &args.config {
        Some(path) => match FlashConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("✗ Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => FlashConfig::default(),
    };
    config.wipe |= args.wipe;
    if args.serial.is_some() {
        config.serial = args.serial.clone();
    }
    if config.reconnect_timeout_secs == 0 {
        config.reconnect_timeout_secs = args.timeout;
    }

    if let Err(e) = run(&args, &config) {
        error!("Flash failed: {e:#}");
        eprintln!("✗ FAILED: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &FlashConfig) -> anyhow::Result<()> {
    let archive_path = args
        .archive
        .clone()
        .or_else(|| config.archive_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow::anyhow!("no archive given (argument or config file)"))?;
    let archive = ZipBlobArchive::open(&archive_path)?;
    let plan = FlashPlan::from_archive(&archive)?;
    eprintln!(
        "Plan: {} commands, {} MiB to flash",
        plan.commands().len(),
        plan.total_flash_bytes() / (1024 * 1024)
    );
    if config.wipe {
        eprintln!("! Wipe enabled: erase commands will be executed");
    }

    let timeout = Duration::from_secs(config.reconnect_timeout_secs.max(1));
    let serial = config.serial.clone();
    let session = wait_for_device(serial.as_deref(), timeout)?;

    let observer = CliObserver {
        verbose: args.verbose,
    };
    let executor = FlashExecutor::new(&plan, &archive, &observer, config.wipe);

    let mut reconnect = move || {
        // Give the device a moment to drop off the bus before polling.
        thread::sleep(Duration::from_secs(2));
        wait_for_device(serial.as_deref(), timeout)
    };
    executor.run(session, &mut reconnect)?;
    Ok(())
}
