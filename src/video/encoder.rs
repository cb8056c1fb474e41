//! Encoder boundary: turns a composed stream pair into a container file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::{write_wav, AudioStream};
use crate::error::{Result, VideoError};
use crate::video::stream::FrameStream;
use crate::video::tool_available;

/// Frames between progress log lines
const PROGRESS_INTERVAL: usize = 150;

/// Container/codec settings handed to the encoder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncodeOptions {
    /// Video codec passed to ffmpeg
    pub codec: String,

    /// x264 speed/size trade-off
    pub preset: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Output pixel format; yuv420p plays everywhere
    pub pixel_format: String,

    /// Move the index to the front of the file for progressive playback
    pub fast_start: bool,

    pub audio_codec: String,

    pub audio_bitrate: String,

    /// Output frame rate; the stream's own rate when absent
    pub fps: Option<f64>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 18,
            pixel_format: "yuv420p".to_string(),
            fast_start: true,
            audio_codec: "aac".to_string(),
            audio_bitrate: "320k".to_string(),
            fps: None,
        }
    }
}

impl EncodeOptions {
    /// ffmpeg output arguments (everything between the inputs and the output path)
    pub fn output_args(&self, has_audio: bool) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
        ];
        if let Some(fps) = self.fps {
            args.extend(["-r".to_string(), fps.to_string()]);
        }
        if has_audio {
            args.extend([
                "-c:a".to_string(),
                self.audio_codec.clone(),
                "-b:a".to_string(),
                self.audio_bitrate.clone(),
            ]);
        } else {
            args.push("-an".to_string());
        }
        if self.fast_start {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        args
    }
}

/// Represents an encoded video output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub duration: f64,
    pub frame_count: usize,
    pub file_size: u64,
}

/// Consumes a composed stream pair completely and writes one file
///
/// Implementations either leave a complete file at `output` or nothing.
pub trait MediaEncoder: Send + Sync {
    fn encode(
        &self,
        video: &FrameStream,
        audio: Option<&AudioStream>,
        output: &Path,
        options: &EncodeOptions,
    ) -> Result<EncodedVideo>;
}

/// Encoder that pipes raw frames into the `ffmpeg` binary
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Result<Self> {
        if !tool_available("ffmpeg") {
            return Err(VideoError::EncodingFailed {
                reason: "FFmpeg not found. Please install FFmpeg.".to_string(),
            }
            .into());
        }
        Ok(Self)
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn encode(
        &self,
        video: &FrameStream,
        audio: Option<&AudioStream>,
        output: &Path,
        options: &EncodeOptions,
    ) -> Result<EncodedVideo> {
        let info = *video.info();
        if options.pixel_format == "yuv420p" && (info.width % 2 != 0 || info.height % 2 != 0) {
            return Err(VideoError::InvalidParameters {
                details: format!(
                    "yuv420p output needs even dimensions, got {}x{}",
                    info.width, info.height
                ),
            }
            .into());
        }

        let parent = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        // Scratch WAV lives only for this call
        let scratch = tempfile::tempdir()?;
        let wav_path = match audio {
            Some(audio) => {
                let path = scratch.path().join("mix.wav");
                write_wav(audio, &path)?;
                Some(path)
            }
            None => None,
        };

        // Encode beside the destination so the final rename stays on one filesystem
        let partial = tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(".mp4")
            .tempfile_in(&parent)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", info.width, info.height)])
            .args(["-r", &info.fps.to_string()])
            .args(["-i", "pipe:0"]);
        if let Some(wav) = &wav_path {
            cmd.arg("-i").arg(wav);
        }
        cmd.args(options.output_args(wav_path.is_some()))
            .args(["-f", "mp4"])
            .arg(partial.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!("Running {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| VideoError::EncodingFailed {
            reason: format!("Failed to spawn FFmpeg process: {}", e),
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "FFmpeg stdin unavailable".to_string(),
        })?;

        info!(
            "Encoding {} frames ({}x{} @ {:.2} fps) to {}",
            info.frame_count,
            info.width,
            info.height,
            info.fps,
            output.display()
        );

        for index in 0..info.frame_count {
            let written = video.frame(index).and_then(|frame| {
                stdin.write_all(frame.as_rgb_bytes()).map_err(|e| {
                    VideoError::EncodingFailed {
                        reason: format!("Failed to write frame {} to FFmpeg: {}", index, e),
                    }
                    .into()
                })
            });
            if let Err(e) = written {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                warn!("Encoding of {} aborted at frame {}", output.display(), index);
                return Err(e);
            }
            if index > 0 && index % PROGRESS_INTERVAL == 0 {
                debug!("Encoded {}/{} frames", index, info.frame_count);
            }
        }
        drop(stdin);

        let result = child.wait_with_output().map_err(|e| VideoError::EncodingFailed {
            reason: format!("FFmpeg execution failed: {}", e),
        })?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(VideoError::EncodingFailed {
                reason: format!("FFmpeg failed: {}", stderr.trim()),
            }
            .into());
        }

        partial.persist(output).map_err(|e| VideoError::EncodingFailed {
            reason: format!("Failed to move output into place: {}", e.error),
        })?;

        let file_size = fs::metadata(output)?.len();
        info!(
            "Wrote {} ({:.1} MB)",
            output.display(),
            file_size as f64 / 1024.0 / 1024.0
        );

        Ok(EncodedVideo {
            path: output.to_path_buf(),
            duration: info.duration(),
            frame_count: info.frame_count,
            file_size,
        })
    }
}
