use std::collections::{HashMap, VecDeque};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, VideoMetadata};

/// A decodable video: native properties plus a lazy sequence of frames
pub trait MediaSource {
    fn metadata(&self) -> &VideoMetadata;

    /// Decode the next frame, `None` once the video is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// How input frames are acquired during rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Decode one frame per output frame and release it after compositing
    #[default]
    Streaming,
    /// Decode every needed frame before rendering starts
    Buffered,
}

/// Video decoded by an external `ffmpeg` process into packed RGB24 frames
pub struct FfmpegSource {
    path: PathBuf,
    metadata: VideoMetadata,
    decoder: Option<Decoder>,
    decoded: usize,
    finished: bool,
}

struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegSource {
    /// Probe a video with ffprobe. Decoding starts on the first frame request.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(VideoError::LoadFailed { path: path.display().to_string() }.into());
        }

        let metadata = probe(path)?;
        info!(
            "Video metadata: {}x{} @ {:.2}fps, {} frames, {:.2}s",
            metadata.width, metadata.height, metadata.fps, metadata.frame_count, metadata.duration
        );

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            decoder: None,
            decoded: 0,
            finished: false,
        })
    }

    fn spawn_decoder(&self) -> Result<Decoder> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args([
                "-map", "0:v:0",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{}x{}", self.metadata.width, self.metadata.height),
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| VideoError::DecodingFailed {
            reason: format!("failed to start ffmpeg: {}", e),
        })?;
        debug!("ffmpeg decoder started (pid {})", child.id());

        let stdout = child.stdout.take().ok_or_else(|| VideoError::DecodingFailed {
            reason: "failed to capture ffmpeg stdout".to_string(),
        })?;
        let stderr = child.stderr.take().map(|stderr| {
            // Drain stderr so ffmpeg never blocks on a full pipe
            std::thread::spawn(move || {
                let mut output = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut output);
                output
            })
        });

        Ok(Decoder {
            child,
            stdout: BufReader::with_capacity(self.metadata.frame_bytes(), stdout),
            stderr,
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let Some(mut decoder) = self.decoder.take() else {
            return Ok(());
        };

        let status = decoder.child.wait()?;
        let stderr = decoder
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() && self.decoded == 0 {
            return Err(VideoError::DecodingFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr.trim()),
            }
            .into());
        }
        if !status.success() {
            warn!("ffmpeg decoder exited with {} after {} frames", status, self.decoded);
        }
        debug!("Decoder finished after {} frames", self.decoded);
        Ok(())
    }
}

impl MediaSource for FfmpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if self.decoder.is_none() {
            self.decoder = Some(self.spawn_decoder()?);
        }

        let mut data = vec![0u8; self.metadata.frame_bytes()];
        let read = match self.decoder.as_mut() {
            Some(decoder) => decoder.stdout.read_exact(&mut data),
            None => return Ok(None),
        };

        match read {
            Ok(()) => {
                self.decoded += 1;
                Frame::from_rgb_bytes(self.metadata.width, self.metadata.height, data)
                    .map(Some)
                    .ok_or_else(|| {
                        VideoError::DecodingFailed {
                            reason: "decoded frame has the wrong size".to_string(),
                        }
                        .into()
                    })
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finish()?;
                Ok(None)
            }
            Err(e) => Err(VideoError::DecodingFailed {
                reason: format!("reading frame {}: {}", self.decoded, e),
            }
            .into()),
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            let _ = decoder.child.kill();
            let _ = decoder.child.wait();
        }
    }
}

/// Frames held in memory, mainly for tests and pre-decoded input
pub struct MemorySource {
    metadata: VideoMetadata,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(metadata: VideoMetadata, frames: Vec<Frame>) -> Self {
        Self {
            metadata,
            frames: frames.into(),
        }
    }

    /// Decode up to `limit` frames from `source` before rendering starts
    ///
    /// Only the frames the output will consult are read, so a video longer
    /// than the log is never decoded past the end of the plan.
    pub fn buffer_from(source: &mut dyn MediaSource, limit: usize) -> Result<Self> {
        let metadata = source.metadata().clone();
        let mut frames = VecDeque::with_capacity(limit.min(metadata.frame_count));

        while frames.len() < limit {
            match source.next_frame()? {
                Some(frame) => frames.push_back(frame),
                None => break,
            }
            if frames.len() % 100 == 0 {
                info!("  Buffered {}/{} frames", frames.len(), limit);
            }
        }

        info!("Buffered {} video frames in memory", frames.len());
        Ok(Self { metadata, frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl MediaSource for MemorySource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

/// Random-access-forward view over a media source
///
/// Holds at most one decoded frame. Requests must use non-decreasing native
/// frame indices; frames between requests are decoded and dropped.
pub struct FrameCursor<'s> {
    source: &'s mut dyn MediaSource,
    next_index: usize,
    current: Option<(usize, Frame)>,
    exhausted: bool,
}

impl<'s> FrameCursor<'s> {
    pub fn new(source: &'s mut dyn MediaSource) -> Self {
        Self {
            source,
            next_index: 0,
            current: None,
            exhausted: false,
        }
    }

    /// Frame with native index `video_index`, `None` once the video ran out
    pub fn frame_at(&mut self, video_index: usize) -> Result<Option<&Frame>> {
        while !self.exhausted && self.next_index <= video_index {
            match self.source.next_frame()? {
                Some(frame) => {
                    self.current = Some((self.next_index, frame));
                    self.next_index += 1;
                }
                None => {
                    self.exhausted = true;
                    self.current = None;
                }
            }
        }

        Ok(self
            .current
            .as_ref()
            .filter(|(index, _)| *index == video_index)
            .map(|(_, frame)| frame))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn probe(path: &Path) -> Result<VideoMetadata> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_streams",
            "-show_format",
            "-of", "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| VideoError::ProbeFailed {
            path: path.display().to_string(),
            reason: format!("failed to run ffprobe: {}", e),
        })?;

    if !output.status.success() {
        return Err(VideoError::ProbeFailed {
            path: path.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe(&json, &path.display().to_string())
}

/// Turn ffprobe's JSON report into video metadata
fn parse_probe(json: &str, path: &str) -> Result<VideoMetadata> {
    let invalid = |details: String| VideoError::InvalidParameters {
        details: format!("{}: {}", path, details),
    };

    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| VideoError::ProbeFailed {
        path: path.to_string(),
        reason: format!("unreadable ffprobe output: {}", e),
    })?;

    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| invalid("no video stream".to_string()))?;

    let (mut width, mut height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(invalid("missing frame dimensions".to_string()).into()),
    };

    // ffmpeg auto-rotates on decode, so the decoded frame follows the display orientation
    if rotation(&stream).rem_euclid(180) == 90 {
        std::mem::swap(&mut width, &mut height);
    }

    let fps = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(parse_rate)
        .ok_or_else(|| invalid("unknown frame rate".to_string()))?;

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .or_else(|| duration.map(|d| (d * fps).round() as usize))
        .filter(|n| *n > 0)
        .ok_or_else(|| invalid("unknown frame count".to_string()))?;

    Ok(VideoMetadata {
        width,
        height,
        fps,
        frame_count,
        duration: duration.unwrap_or(frame_count as f64 / fps),
    })
}

/// Parse an ffprobe rate such as `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn rotation(stream: &ProbeStream) -> i64 {
    if let Some(rotate) = stream.tags.get("rotate").and_then(|r| r.parse::<i64>().ok()) {
        return rotate;
    }
    stream
        .side_data_list
        .iter()
        .find_map(|entry| entry.get("rotation").and_then(|r| r.as_i64()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(frames: usize) -> VideoMetadata {
        VideoMetadata {
            width: 4,
            height: 2,
            fps: 30.0,
            frame_count: frames,
            duration: frames as f64 / 30.0,
        }
    }

    fn numbered_frames(count: usize) -> Vec<Frame> {
        (0..count).map(|i| Frame::new_filled(4, 2, [i as u8, 0, 0])).collect()
    }

    #[test]
    fn test_parse_probe_phone_video() {
        let json = r#"{
            "streams": [{
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30/1",
                "nb_frames": "450",
                "duration": "15.015000",
                "tags": { "rotate": "90" }
            }],
            "format": { "duration": "15.100000" }
        }"#;

        let meta = parse_probe(json, "phone.mp4").unwrap();
        assert_eq!((meta.width, meta.height), (1080, 1920));
        assert!((meta.fps - 29.97).abs() < 0.01);
        assert_eq!(meta.frame_count, 450);
        assert!((meta.duration - 15.015).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_without_frame_count() {
        let json = r#"{
            "streams": [{ "width": 640, "height": 480, "avg_frame_rate": "0/0", "r_frame_rate": "25/1" }],
            "format": { "duration": "4.0" }
        }"#;

        let meta = parse_probe(json, "clip.mkv").unwrap();
        assert_eq!(meta.fps, 25.0);
        assert_eq!(meta.frame_count, 100);
        assert_eq!(meta.duration, 4.0);
    }

    #[test]
    fn test_parse_probe_rejects_missing_stream() {
        let err = parse_probe(r#"{ "streams": [] }"#, "audio.m4a").unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_open_missing_file() {
        let err = FfmpegSource::open("/no/such/video.mp4").err().unwrap();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_cursor_selects_frames_in_order() {
        let mut source = MemorySource::new(metadata(10), numbered_frames(10));
        let mut cursor = FrameCursor::new(&mut source);

        assert_eq!(cursor.frame_at(0).unwrap().unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(cursor.frame_at(0).unwrap().unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(cursor.frame_at(4).unwrap().unwrap().get_pixel(0, 0)[0], 4);
        assert_eq!(cursor.frame_at(9).unwrap().unwrap().get_pixel(0, 0)[0], 9);
        assert!(!cursor.is_exhausted());
        assert!(cursor.frame_at(10).unwrap().is_none());
        assert!(cursor.is_exhausted());
        assert!(cursor.frame_at(11).unwrap().is_none());
    }

    #[test]
    fn test_buffering_stops_at_limit() {
        let mut source = MemorySource::new(metadata(450), numbered_frames(450));
        let buffered = MemorySource::buffer_from(&mut source, 150).unwrap();

        assert_eq!(buffered.len(), 150);
        // The rest of the video is never consulted
        assert_eq!(source.len(), 300);
    }
}
