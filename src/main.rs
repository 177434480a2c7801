use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};

use flight_sync::{config::Config, video::DecodeMode, SyncEngine};

#[derive(Parser)]
#[command(
    name = "flight-sync",
    version,
    about = "Synchronize a flight telemetry log with the onboard video",
    long_about = "Flight-Sync aligns a high-rate telemetry CSV with the video recorded during the same flight and renders both into a multi-panel visualization video."
)]
struct Cli {
    /// Telemetry log (CSV with elapsed_time and timestamp columns)
    #[arg(short, long)]
    log: PathBuf,

    /// Video recorded during the flight
    #[arg(short = 'i', long)]
    video: PathBuf,

    /// Output video file path (default: animation_results/synchronized_flight_<timestamp>.mp4)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output frame rate (default: the video's frame rate)
    #[arg(long)]
    fps: Option<f64>,

    /// Decode every needed video frame before rendering
    #[arg(long)]
    buffered: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_output() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from("animation_results").join(format!("synchronized_flight_{}.mp4", stamp))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting Flight-Sync v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    if cli.fps.is_some() {
        config.output.fps = cli.fps;
    }
    if cli.buffered {
        config.video.decode = DecodeMode::Buffered;
    }

    let output = cli.output.clone().unwrap_or_else(default_output);
    info!("Log: {:?}", cli.log);
    info!("Video: {:?}", cli.video);
    info!("Output: {:?}", output);

    if !cli.yes && !confirm("Render the synchronized video?")? {
        info!("Aborted by user");
        return Ok(());
    }

    let engine = SyncEngine::new(config)?;

    // Ctrl-C stops the render loop between frames; the encoder is closed cleanly
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current frame");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let (log, video, out) = (cli.log.clone(), cli.video.clone(), output.clone());
    let result = tokio::task::spawn_blocking(move || engine.run(&log, &video, &out)).await?;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e.user_message());
            return Err(e.into());
        }
    };

    // Each warning was logged where it arose
    if !report.warnings.is_empty() {
        warn!("Finished with {} warning(s)", report.warnings.len());
    }
    if report.cancelled {
        warn!(
            "Cancelled: {} of {} frames written to {:?}",
            report.frames_written, report.plan.output_frame_count, output
        );
    } else {
        info!("Done! {} frames saved to {:?}", report.frames_written, output);
    }
    Ok(())
}
