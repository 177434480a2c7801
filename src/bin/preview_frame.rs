// Render a single composite frame to PNG for checking the panel layout
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{info, Level};

use flight_sync::{
    config::Config,
    video::{FfmpegSource, FrameCursor, MediaSource, VideoMetadata},
    SyncEngine,
};

#[derive(Parser)]
#[command(name = "preview_frame", about = "Render one synchronized frame to a PNG")]
struct Args {
    /// Telemetry log
    #[arg(short, long)]
    log: PathBuf,

    /// Flight video; the video panel shows a placeholder when omitted
    #[arg(short = 'i', long)]
    video: Option<PathBuf>,

    /// Time into the flight in seconds
    #[arg(short, long, default_value_t = 0.0)]
    time: f64,

    /// PNG to write
    #[arg(short, long, default_value = "preview.png")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let engine = SyncEngine::new(config)?;
    let store = engine.load_telemetry(&args.log)?;

    let mut source = args.video.as_ref().map(FfmpegSource::open).transpose()?;
    let metadata = match &source {
        Some(source) => source.metadata().clone(),
        None => {
            // No video: plan against a nominal one covering the whole log
            let fps = engine.config().output.fps.unwrap_or(30.0);
            let frame_count = (store.duration() * fps).ceil() as usize + 1;
            VideoMetadata {
                width: 640,
                height: 480,
                fps,
                frame_count,
                duration: frame_count as f64 / fps,
            }
        }
    };

    let prepared = engine.prepare(&store, &metadata)?;
    let plan = &prepared.plan;
    let index = (args.time * plan.output_frame_rate).round() as usize;
    if index >= plan.output_frame_count {
        return Err(anyhow!(
            "time {:.2}s is past the synchronized range ({:.2}s)",
            args.time,
            plan.output_duration()
        ));
    }

    let mut cursor = source.as_mut().map(|s| FrameCursor::new(s as &mut dyn MediaSource));
    let video = match cursor.as_mut() {
        Some(cursor) => cursor.frame_at(plan.video_index_of(index))?,
        None => None,
    };

    let rendered = engine
        .compositor()
        .compose_at(&prepared.series, index, video)
        .ok_or_else(|| anyhow!("no sample at output index {}", index))?;
    rendered.frame.save_png(&args.output)?;

    info!("Frame {} (t = {:.2}s) written to {:?}", index, plan.time_of(index), args.output);
    if !rendered.placeholders.is_empty() {
        info!("Panels without data: {}", rendered.placeholders.join(", "));
    }
    Ok(())
}
