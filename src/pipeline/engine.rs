use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{Result, Warning},
    render::{FrameCompositor, TextRenderer},
    sync::{plan, resample, ResampledSeries, SyncPlan},
    telemetry::{loader::kind_summary, TelemetryLoader, TimeSeriesStore},
    video::{
        DecodeMode, EncodedVideo, FfmpegSource, FrameCursor, FrameSink, MediaSource, MemorySource,
        StreamEncoder, VideoMetadata,
    },
};

/// Render progress after a frame has been written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Frames written so far
    pub frames_written: usize,
    pub total_frames: usize,
    pub elapsed: Duration,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total_frames == 0 {
            1.0
        } else {
            self.frames_written as f64 / self.total_frames as f64
        }
    }

    /// Rendered frames per wall-clock second
    pub fn render_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.frames_written as f64 / secs } else { 0.0 }
    }
}

pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Everything computed before the first frame is decoded
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plan: SyncPlan,
    pub series: ResampledSeries,
    pub warnings: Vec<Warning>,
}

impl Prepared {
    /// Leading video frames the plan consults; later ones are never decoded
    pub fn video_frames_needed(&self) -> usize {
        match self.plan.output_frame_count.checked_sub(1) {
            Some(last) => self.plan.video_index_of(last) + 1,
            None => 0,
        }
    }
}

/// Outcome of a render run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub plan: SyncPlan,
    pub frames_written: usize,
    pub warnings: Vec<Warning>,

    /// Set when the run stopped early on request
    pub cancelled: bool,

    /// Encoded file details, when the sink writes one
    pub output: Option<EncodedVideo>,
}

/// Drives a full synchronization run
///
/// The pipeline has two phases:
/// 1. Prepare - load the log, plan the output grid, resample every channel
/// 2. Render - for each output index: fetch the video frame, compose, encode
///
/// Rendering is sequential; frames reach the sink in index order. A shared
/// flag lets another thread stop the run between frames.
pub struct SyncEngine {
    config: Config,
    compositor: FrameCompositor,
    progress: Option<ProgressCallback>,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create an engine, loading the configured or a system font
    pub fn new(config: Config) -> Result<Self> {
        let text = TextRenderer::load(config.render.font_path.as_deref());
        Self::with_text(config, text)
    }

    /// Create an engine with an already resolved text renderer
    pub fn with_text(config: Config, text: TextRenderer) -> Result<Self> {
        config.validate()?;
        let compositor = FrameCompositor::new(&config.render, config.output.resolution(), text);
        Ok(Self {
            config,
            compositor,
            progress: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Called after every written frame, on the rendering thread
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Flag that stops the render loop before the next frame once set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    /// Load the telemetry log with the configured channel table
    pub fn load_telemetry<P: AsRef<Path>>(&self, path: P) -> Result<TimeSeriesStore> {
        let store = TelemetryLoader::new(self.config.channels.clone()).load(path)?;
        let (continuous, discrete, categorical) = kind_summary(&store);
        info!(
            "Telemetry: {} rows, {:.2}s, channels: {} continuous, {} discrete, {} categorical",
            store.len(),
            store.duration(),
            continuous,
            discrete,
            categorical
        );
        Ok(store)
    }

    /// Plan the output grid and resample the log onto it
    pub fn prepare(&self, store: &TimeSeriesStore, video: &VideoMetadata) -> Result<Prepared> {
        let output_rate = self.config.output.fps.unwrap_or(video.fps);
        let plan = plan(store.duration(), video.fps, video.frame_count, output_rate)?;

        let resampled = resample(store, &plan)?;

        let missing = self.compositor.missing_channels(&resampled.series);
        if !missing.is_empty() {
            warn!("Channels not in the log, affected panels show a placeholder: {}", missing.join(", "));
        }

        Ok(Prepared {
            plan,
            series: resampled.series,
            warnings: resampled.warnings,
        })
    }

    /// Render every planned frame from `source` into `sink`
    ///
    /// The sink is closed on success and on cancellation. On error it is
    /// closed as well, and the original error is returned.
    pub fn render(&self, prepared: &Prepared, source: &mut dyn MediaSource, sink: &mut dyn FrameSink) -> Result<RunReport> {
        let mut warnings = prepared.warnings.clone();
        let outcome = self.render_frames(prepared, source, sink, &mut warnings);

        let (frames_written, cancelled) = match outcome {
            Ok(done) => done,
            Err(e) => {
                if let Err(close_err) = sink.close() {
                    debug!("Closing sink after failure also failed: {}", close_err);
                }
                return Err(e);
            }
        };

        let output = sink.close()?;
        info!(
            "Rendered {}/{} frames{}",
            frames_written,
            prepared.plan.output_frame_count,
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(RunReport {
            plan: prepared.plan,
            frames_written,
            warnings,
            cancelled,
            output,
        })
    }

    fn render_frames(
        &self,
        prepared: &Prepared,
        source: &mut dyn MediaSource,
        sink: &mut dyn FrameSink,
        warnings: &mut Vec<Warning>,
    ) -> Result<(usize, bool)> {
        let plan = &prepared.plan;
        let total = plan.output_frame_count;
        let report_every = (plan.output_frame_rate.round() as usize).max(1);
        let started = Instant::now();

        let mut cursor = FrameCursor::new(source);
        let mut video_ended = false;
        let mut written = 0;

        for index in 0..total {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Cancelled after {} of {} frames", written, total);
                return Ok((written, true));
            }

            let video_index = plan.video_index_of(index);
            let video = cursor.frame_at(video_index)?;
            if video.is_none() && !video_ended {
                video_ended = true;
                let warning = Warning::MissingFrame { output_index: index, video_index };
                warn!("{}", warning);
                warnings.push(warning);
            }

            let Some(rendered) = self.compositor.compose_at(&prepared.series, index, video) else {
                break;
            };
            if !rendered.placeholders.is_empty() && index == 0 {
                debug!("Panels without data: {}", rendered.placeholders.join(", "));
            }

            sink.submit(index, &rendered.frame)?;
            written += 1;

            let progress = Progress {
                frames_written: written,
                total_frames: total,
                elapsed: started.elapsed(),
            };
            if written % report_every == 0 || written == total {
                info!(
                    "Progress: {}/{} ({:.1}%), {:.1} frames/s",
                    written,
                    total,
                    progress.fraction() * 100.0,
                    progress.render_rate()
                );
            }
            if let Some(callback) = &self.progress {
                callback(progress);
            }
        }

        Ok((written, false))
    }

    /// Full run: log and video paths in, encoded video out
    ///
    /// Nothing is decoded or written until the log has loaded and the plan
    /// and resampling have succeeded.
    pub fn run<P: AsRef<Path>>(&self, log: P, video: P, output: P) -> Result<RunReport> {
        let (log, video, output) = (log.as_ref(), video.as_ref(), output.as_ref());
        info!("Starting synchronization");
        info!("   Log: {:?}", log);
        info!("   Video: {:?}", video);
        info!("   Output: {:?}", output);

        let store = self.load_telemetry(log)?;
        let mut source = FfmpegSource::open(video)?;
        let prepared = self.prepare(&store, source.metadata())?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut encoder = StreamEncoder::open(
            output,
            prepared.plan.output_frame_rate,
            self.compositor.size(),
            &self.config.output,
        )?;

        match self.config.video.decode {
            DecodeMode::Streaming => self.render(&prepared, &mut source, &mut encoder),
            DecodeMode::Buffered => {
                let needed = prepared.video_frames_needed();
                info!("Buffering {} video frames before rendering", needed);
                let mut buffered = MemorySource::buffer_from(&mut source, needed)?;
                drop(source);
                self.render(&prepared, &mut buffered, &mut encoder)
            }
        }
    }
}
