//! Headless frame conductor
//!
//! Claims the network, starts transmitting and accepts single-letter commands
//! on stdin:
//!
//! - `p` play/pause toggle
//! - `r` reset to frame 0
//! - `q` quit
//!
//! Usage:
//!   frame-conductor --target-frame 2000 --fps 30
//!   frame-conductor --dry-run --no-singleton
//!   frame-conductor --raw-datagrams   # bare payloads, for debugging receivers
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use frame_conductor::config::DEFAULT_CONFIG_FILE;
use frame_conductor::transmitters::{DatagramTransmitter, MemoryTransmitter, SacnTransmitter};
use frame_conductor::{
    Conductor, ConfigStore, ConfigUpdate, Coordinator, CoordinatorConfig, Progress,
    Transmitter, UpdateRate,
};

const BAR_WIDTH: usize = 40;

/// Frame Conductor - frame counter sender
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Last frame to send (overrides the config file)
    #[arg(long)]
    target_frame: Option<u16>,

    /// Frame rate in frames per second (overrides the config file)
    #[arg(long)]
    fps: Option<u32>,

    /// Destination universe (overrides the config file)
    #[arg(long)]
    universe: Option<u16>,

    /// Payload length in channels (overrides the config file)
    #[arg(long)]
    frame_length: Option<usize>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Disable network singleton protection
    #[arg(long)]
    no_singleton: bool,

    /// Record frames in memory instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Send bare payload bytes instead of sACN packets (debugging only)
    #[arg(long, conflicts_with = "dry_run")]
    raw_datagrams: bool,

    /// UDP port used for singleton coordination
    #[arg(long, default_value = "9001")]
    singleton_port: u16,
}

impl Args {
    fn overrides(&self) -> ConfigUpdate {
        ConfigUpdate {
            total_frames: self.target_frame,
            frame_rate: self.fps,
            universe: self.universe,
            frame_length: self.frame_length,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let coordinator = if args.no_singleton {
        warn!("Network singleton protection disabled");
        None
    } else {
        let config = CoordinatorConfig { port: args.singleton_port, ..CoordinatorConfig::default() };
        let coordinator = Coordinator::new(config).await.with_conflict_callback(|peer| {
            error!("Another Frame Conductor instance is already running on the network ({})", peer);
            error!("Only one instance is allowed per network");
        });
        if !coordinator.start().await {
            std::process::exit(1);
        }
        Some(coordinator)
    };

    let result = run(&args).await;

    if let Some(coordinator) = coordinator {
        coordinator.stop();
    }
    result
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let transmitter: Box<dyn Transmitter> = if args.dry_run {
        info!("Dry run: frames are recorded, not sent");
        Box::new(MemoryTransmitter::new())
    } else if args.raw_datagrams {
        warn!("Raw datagram output: payloads carry no sACN framing");
        Box::new(DatagramTransmitter::new())
    } else {
        Box::new(SacnTransmitter::new())
    };

    // Flag overrides apply to this run only and are not written back
    let store = ConfigStore::new(&args.config);
    let config = store.load().apply(&args.overrides());
    config.validate().context("invalid transmission settings")?;
    let conductor = Conductor::new(config, transmitter);

    conductor.start().await.context("failed to start transmission")?;
    info!(
        "Sending {} frames at {} fps to universe {} ({} channels)",
        config.total_frames, config.frame_rate, config.universe, config.frame_length
    );
    eprintln!("Commands: p = play/pause, r = reset, q = quit");

    let mut progress = conductor.progress_updates(UpdateRate::Max(10));
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                info!("Interrupted");
                break;
            }
            Some(snapshot) = progress.next() => render(&snapshot),
            line = commands.next_line(), if stdin_open => {
                let Some(line) = line.context("failed to read stdin")? else {
                    // Keep running until Ctrl+C
                    stdin_open = false;
                    continue;
                };
                match line.trim() {
                    "p" => match conductor.toggle().await {
                        Ok(status) => eprintln!("\n{}", status),
                        Err(e) => eprintln!("\n{}", e),
                    },
                    "r" => {
                        conductor.reset().await;
                        eprintln!("\nReset");
                    }
                    "q" => break,
                    "" => {}
                    other => eprintln!("\nUnknown command: {}", other),
                }
            }
        }
    }

    conductor.shutdown().await;
    Ok(())
}

fn render(progress: &Progress) {
    let filled = (progress.percent.min(100) as usize * BAR_WIDTH) / 100;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));
    let mut stderr = std::io::stderr().lock();
    let _ = write!(
        stderr,
        "\r[{}] {:>3}% frame {}/{} {:<20}",
        bar, progress.percent, progress.frame, progress.total_frames, progress.status.to_string()
    );
    let _ = stderr.flush();
}
