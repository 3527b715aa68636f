use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::command::TeleopSettings;
use swerve_zenoh_runtime::config::DrivetrainConfig;
use swerve_zenoh_runtime::runtime;

/// Swerve drivetrain runtime over Zenoh (simulated modules)
#[derive(Parser, Debug)]
#[command(name = "swerve-zenoh-runtime")]
#[command(version)]
struct Args {
    /// Drivetrain description (JSON); the built-in four-module rig when omitted
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the startup settle delay
    #[arg(long, value_name = "MS")]
    settle_ms: Option<u64>,

    /// Start teleop in robot-relative mode
    #[arg(long)]
    robot_relative: bool,

    /// Start teleop with closed-loop wheel velocity
    #[arg(long)]
    closed_loop: bool,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match DrivetrainConfig::load(path) {
            Ok(config) => {
                info!("Loaded drivetrain config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => DrivetrainConfig::default(),
    };
    if let Some(ms) = args.settle_ms {
        config.startup_settle_ms = ms;
    }
    if args.robot_relative {
        config.field_relative = false;
    }
    if args.closed_loop {
        config.open_loop = false;
    }

    // Bring-up blocks for the settle delay, so it happens before the async runtime starts
    let (vision_tx, vision_rx) = mpsc::unbounded_channel();
    let drive = match runtime::build_sim_drivetrain(&config, vision_rx) {
        Ok(drive) => drive,
        Err(e) => {
            eprintln!("Drivetrain error: {}", e);
            std::process::exit(1);
        }
    };
    let settings = Arc::new(TeleopSettings::new(config.field_relative, config.open_loop));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(runtime::run(drive, settings, vision_tx)) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
