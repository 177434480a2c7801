use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::{EncoderError, Result};
use crate::video::types::{Frame, OutputParams};

/// Represents an encoded video output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub frame_count: usize,
    pub duration: f64,
    pub file_size: u64,
}

/// Ordered consumer of rendered frames
///
/// Frames must arrive with strictly increasing indices starting at zero; no
/// reordering is done.
pub trait FrameSink {
    fn submit(&mut self, index: usize, frame: &Frame) -> Result<()>;

    /// Flush and release the output. Called once, after the last frame.
    fn close(&mut self) -> Result<Option<EncodedVideo>>;
}

/// Streams raw RGB24 frames into an `ffmpeg` process writing the output file
pub struct StreamEncoder {
    path: PathBuf,
    fps: f64,
    dimensions: (u32, u32),
    next_index: usize,
    process: Option<EncoderProcess>,
}

struct EncoderProcess {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
}

impl StreamEncoder {
    pub fn check_ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Start the encoder. The output file is created by ffmpeg.
    pub fn open<P: AsRef<Path>>(path: P, fps: f64, dimensions: (u32, u32), params: &OutputParams) -> Result<Self> {
        let path = path.as_ref();
        let (width, height) = dimensions;

        if !Self::check_ffmpeg_available() {
            return Err(EncoderError::SpawnFailed {
                path: path.display().to_string(),
                reason: "FFmpeg not found. Please install FFmpeg.".to_string(),
            }
            .into());
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-y"])
            .args([
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{}x{}", width, height),
                "-r", &fps.to_string(),
                "-i", "-",
                "-an",
                "-c:v", &params.codec,
                "-b:v", &format!("{}k", params.bitrate_kbps),
                "-pix_fmt", &params.pixel_format,
                "-metadata", &format!("title={}", params.title),
                "-r", &fps.to_string(),
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| EncoderError::SpawnFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| EncoderError::SpawnFailed {
            path: path.display().to_string(),
            reason: "failed to capture ffmpeg stdin".to_string(),
        })?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                let mut output = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut output);
                output
            })
        });

        info!(
            "Encoder started (pid {}): {}x{} @ {:.2}fps, {} {}kbps -> {:?}",
            child.id(), width, height, fps, params.codec, params.bitrate_kbps, path
        );

        let frame_bytes = width as usize * height as usize * 3;
        Ok(Self {
            path: path.to_path_buf(),
            fps,
            dimensions,
            next_index: 0,
            process: Some(EncoderProcess {
                child,
                stdin: Some(BufWriter::with_capacity(frame_bytes, stdin)),
                stderr,
            }),
        })
    }

    /// Frames accepted so far
    pub fn frames_written(&self) -> usize {
        self.next_index
    }

    fn collect_stderr(process: &mut EncoderProcess) -> String {
        process
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Close stdin, wait for ffmpeg and report its exit
    fn shutdown(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        let flushed = match process.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };

        let status = process.child.wait()?;
        let stderr = Self::collect_stderr(&mut process);

        if !status.success() {
            return Err(EncoderError::Failed {
                status: status.to_string(),
                stderr,
            }
            .into());
        }
        if let Err(e) = flushed {
            return Err(EncoderError::WriteFailed {
                index: self.next_index,
                reason: e.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl FrameSink for StreamEncoder {
    fn submit(&mut self, index: usize, frame: &Frame) -> Result<()> {
        if index != self.next_index {
            return Err(EncoderError::OutOfOrder {
                expected: self.next_index,
                got: index,
            }
            .into());
        }

        let (width, height) = self.dimensions;
        if frame.dimensions() != self.dimensions {
            return Err(EncoderError::FrameSize {
                index,
                width,
                height,
                got_width: frame.width(),
                got_height: frame.height(),
            }
            .into());
        }

        let stdin = self
            .process
            .as_mut()
            .and_then(|p| p.stdin.as_mut())
            .ok_or_else(|| EncoderError::WriteFailed {
                index,
                reason: "encoder already closed".to_string(),
            })?;

        if let Err(e) = stdin.write_all(frame.as_rgb_bytes()) {
            // ffmpeg died; release the process and report what it said
            let reason = match self.process.take() {
                Some(mut process) => {
                    drop(process.stdin.take());
                    let _ = process.child.wait();
                    let stderr = Self::collect_stderr(&mut process);
                    if stderr.is_empty() { e.to_string() } else { format!("{}: {}", e, stderr) }
                }
                None => e.to_string(),
            };
            return Err(EncoderError::WriteFailed { index, reason }.into());
        }

        self.next_index += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<Option<EncodedVideo>> {
        self.shutdown()?;

        let file_size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let video = EncodedVideo {
            path: self.path.clone(),
            frame_count: self.next_index,
            duration: self.next_index as f64 / self.fps,
            file_size,
        };
        info!(
            "Encoded {} frames ({:.2}s, {:.1}MB) to {:?}",
            video.frame_count,
            video.duration,
            video.file_size as f64 / 1024.0 / 1024.0,
            video.path
        );
        Ok(Some(video))
    }
}

impl Drop for StreamEncoder {
    fn drop(&mut self) {
        if self.process.is_some() {
            debug!("Encoder dropped without close; finalizing {:?}", self.path);
            if let Err(e) = self.shutdown() {
                warn!("Encoder shutdown failed: {}", e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    /// mpeg4 ships with every ffmpeg build, unlike libx264
    fn params() -> OutputParams {
        OutputParams {
            codec: "mpeg4".to_string(),
            bitrate_kbps: 200,
            ..Default::default()
        }
    }

    fn encoder(dir: &tempfile::TempDir, dimensions: (u32, u32), params: &OutputParams) -> Option<StreamEncoder> {
        if !StreamEncoder::check_ffmpeg_available() {
            eprintln!("ffmpeg not available, skipping");
            return None;
        }
        Some(StreamEncoder::open(dir.path().join("out.mp4"), 10.0, dimensions, params).unwrap())
    }

    #[test]
    fn test_writes_expected_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let Some(mut encoder) = encoder(&dir, (64, 48), &params()) else { return };

        for i in 0..5 {
            let frame = Frame::new_filled(64, 48, [i as u8 * 40, 0, 0]);
            encoder.submit(i, &frame).unwrap();
        }
        assert_eq!(encoder.frames_written(), 5);

        let video = encoder.close().unwrap().unwrap();
        assert_eq!(video.frame_count, 5);
        assert!((video.duration - 0.5).abs() < 1e-9);
        assert!(video.file_size > 0);
        assert!(dir.path().join("out.mp4").exists());
    }

    #[test]
    fn test_rejects_out_of_order_and_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let Some(mut encoder) = encoder(&dir, (64, 48), &params()) else { return };
        let frame = Frame::new_filled(64, 48, [0, 0, 0]);

        let err = encoder.submit(1, &frame).unwrap_err();
        assert!(matches!(err, SyncError::Encoder(EncoderError::OutOfOrder { expected: 0, got: 1 })));

        let small = Frame::new_filled(32, 48, [0, 0, 0]);
        let err = encoder.submit(0, &small).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Encoder(EncoderError::FrameSize { index: 0, got_width: 32, .. })
        ));

        // Rejections leave the stream usable
        encoder.submit(0, &frame).unwrap();
        encoder.submit(1, &frame).unwrap();
        assert_eq!(encoder.close().unwrap().unwrap().frame_count, 2);
    }

    #[test]
    fn test_dead_encoder_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let broken = OutputParams {
            codec: "no_such_codec".to_string(),
            ..params()
        };
        // Frames larger than a pipe buffer so writes block until ffmpeg exits
        let Some(mut encoder) = encoder(&dir, (256, 256), &broken) else { return };
        let frame = Frame::new_filled(256, 256, [0, 0, 0]);

        let failure = (0..100).find_map(|i| encoder.submit(i, &frame).err());
        assert!(matches!(failure, Some(SyncError::Encoder(EncoderError::WriteFailed { .. }))));

        // The process is already released; closing again is a no-op
        assert!(encoder.close().is_ok());
    }

    #[test]
    fn test_drop_finalizes_output() {
        let dir = tempfile::tempdir().unwrap();
        let Some(mut encoder) = encoder(&dir, (64, 48), &params()) else { return };

        for i in 0..3 {
            encoder.submit(i, &Frame::new_filled(64, 48, [0, 90, 0])).unwrap();
        }
        drop(encoder);

        let size = std::fs::metadata(dir.path().join("out.mp4")).map(|m| m.len()).unwrap_or(0);
        assert!(size > 0);
    }
}
