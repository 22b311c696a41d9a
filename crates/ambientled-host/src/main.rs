//! AmbientLed host entry point.
//!
//! Loads the configuration, opens every capture session and controller link,
//! then runs the capture and send loops until Ctrl-C.
//!
//! # Startup
//!
//! ```text
//! main()
//!  └─ load_config()          -- JSON or TOML, by extension
//!  └─ AppConfig::to_topology -- validation; any error aborts before I/O
//!  └─ Pipeline::build()      -- capture sessions, headers, handshakes
//!  └─ Pipeline::start()      -- "capture-loop" and "send-loop" threads
//!  └─ ctrl_c | dead loop      -- stop both loops, blank the strips
//! ```
//!
//! A loop thread that dies on its own ends the process with an error.
//!
//! Setting `RUST_LOG=debug` shows per-segment and per-link detail.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ambientled_host::application::capture_loop::CaptureService;
use ambientled_host::application::pipeline::Pipeline;
use ambientled_host::infrastructure::capture::{native_service, pattern::PatternCaptureService};
use ambientled_host::infrastructure::storage::config::load_config;
use ambientled_host::infrastructure::transport::DeviceLinkConnector;

/// How often the main task checks that both loop threads are alive.
const LOOP_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Where segment colors come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CaptureSource {
    /// Grab the configured screen rectangles.
    Native,
    /// Rotating hue sweep, no display needed.
    Pattern,
}

/// Drives ambient LED strips from screen content.
#[derive(Debug, Parser)]
#[command(name = "ambientled", version, about)]
struct Args {
    /// Configuration file (.json or .toml).
    #[arg(short, long, env = "AMBIENTLED_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Capture source for every segment.
    #[arg(long, value_enum, default_value_t = CaptureSource::Native)]
    capture: CaptureSource,

    /// Validate the configuration and exit without opening any device.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("AmbientLed host starting");

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let topology = config
        .to_topology()
        .with_context(|| format!("validating {}", args.config.display()))?;
    let link_settings = config.link_settings()?;
    let backoff = config.backoff_policy()?;

    info!(
        "{} strip(s), {} segment(s), {} fps capture, {} ups output, lerp {}",
        topology.strips().len(),
        topology.segment_count(),
        topology.timing().fps,
        topology.timing().ups,
        topology.timing().lerp
    );

    if args.check {
        for (index, strip) in topology.strips().iter().enumerate() {
            info!(
                "strip {index}: {} {} with {} LEDs and {} segment(s)",
                strip.device.type_name(),
                strip.device,
                strip.leds,
                strip.segments.len()
            );
        }
        info!("configuration OK");
        return Ok(());
    }

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let capture_service: Box<dyn CaptureService> = match args.capture {
        CaptureSource::Native => native_service(config.sample_step),
        CaptureSource::Pattern => {
            warn!("pattern capture selected; screen content is ignored");
            Box::new(PatternCaptureService::new())
        }
    };
    let connector = Arc::new(DeviceLinkConnector::new(link_settings));

    let pipeline = Pipeline::build(&topology, capture_service.as_ref(), connector, backoff)
        .context("pipeline setup failed")?;
    let running = Arc::new(AtomicBool::new(true));
    let handle = pipeline.start(Arc::clone(&running))?;
    info!("AmbientLed host running; press Ctrl-C to stop");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watchdog = tokio::time::interval(LOOP_CHECK_INTERVAL);
    let dead = loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("waiting for Ctrl-C")?;
                info!("shutdown signal received");
                break None;
            }
            _ = watchdog.tick() => {
                if let Some(name) = handle.dead_loop() {
                    error!("{name} thread exited unexpectedly; shutting down");
                    break Some(name);
                }
            }
        }
    };

    tokio::task::spawn_blocking(move || handle.shutdown())
        .await
        .context("joining loop threads")?;
    info!("AmbientLed host stopped");
    match dead {
        Some(name) => Err(anyhow!("{name} thread died")),
        None => Ok(()),
    }
}
