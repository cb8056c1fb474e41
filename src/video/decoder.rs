//! Decoder boundary: anything that can open a media file as streams.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::audio::{AudioFormat, AudioLoader, AudioStream};
use crate::error::{Result, VideoError};
use crate::video::stream::{FrameSource, FrameStream, StreamInfo};
use crate::video::types::Frame;
use crate::video::{is_image_file, tool_available};

/// How many frames we are willing to decode and drop instead of restarting with a seek
const MAX_FORWARD_SKIP: usize = 90;

/// Frame rate given to still images
const STILL_FPS: f64 = 30.0;

/// A decoded file: its picture, plus its sound when it has any
#[derive(Debug, Clone)]
pub struct OpenedMedia {
    pub video: FrameStream,
    pub audio: Option<AudioStream>,
}

/// Opens media files as frame and audio streams
pub trait MediaDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<OpenedMedia>;

    /// Open an audio-only file such as a music track
    fn open_audio(&self, path: &Path) -> Result<AudioStream> {
        AudioLoader::load(path)
    }
}

/// Decoder backed by the `ffmpeg`/`ffprobe` command line tools
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    audio_format: AudioFormat,
}

impl FfmpegDecoder {
    /// `audio_format` is what embedded audio tracks get converted to
    pub fn new(audio_format: AudioFormat) -> Result<Self> {
        if !tool_available("ffmpeg") || !tool_available("ffprobe") {
            return Err(VideoError::DecodeFailed {
                path: "<none>".to_string(),
                reason: "ffmpeg and ffprobe must be installed and on PATH".to_string(),
            }
            .into());
        }
        info!("Initialized ffmpeg decoder");
        Ok(Self { audio_format })
    }

    fn probe(&self, path: &Path) -> Result<Probe> {
        let output = Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .output()
            .map_err(|e| decode_failed(path, format!("ffprobe failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(decode_failed(path, "ffprobe could not read the file"));
        }

        let report: ProbeReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| decode_failed(path, format!("invalid ffprobe output: {}", e)))?;
        report.into_probe(path)
    }

    fn open_image(&self, path: &Path) -> Result<OpenedMedia> {
        let image = image::open(path).map_err(|e| decode_failed(path, e.to_string()))?;
        let video = FrameStream::from_frames(vec![Frame::new(image.to_rgb8())], STILL_FPS)?;
        Ok(OpenedMedia { video, audio: None })
    }

    fn decode_audio(&self, path: &Path) -> Result<AudioStream> {
        let format = self.audio_format;
        let output = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-vn",
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "-ac",
                &format.channels.to_string(),
                "-ar",
                &format.sample_rate.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| decode_failed(path, format!("ffmpeg failed to start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(decode_failed(path, format!("audio decode failed: {}", stderr.trim())));
        }

        let samples: Vec<f32> = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        AudioStream::new(samples, format.sample_rate, format.channels)
    }
}

impl MediaDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> Result<OpenedMedia> {
        if !path.is_file() {
            return Err(decode_failed(path, "file does not exist"));
        }
        if is_image_file(path) {
            return self.open_image(path);
        }

        let probe = self.probe(path)?;
        let info = StreamInfo::from_duration(
            probe.width,
            probe.height,
            probe.fps,
            probe.duration,
            probe.declared_frames,
        )
        .map_err(|e| decode_failed(path, e.to_string()))?;

        debug!(
            "Probed {}: {}x{} @ {:.2} fps, {:.2}s, audio: {}",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.duration(),
            probe.has_audio
        );

        let source = PipeFrameSource {
            path: path.to_path_buf(),
            info,
            state: Mutex::new(PipeState::default()),
        };
        let video = FrameStream::new(info, Arc::new(source));

        let audio = if probe.has_audio {
            Some(self.decode_audio(path)?)
        } else {
            None
        };

        Ok(OpenedMedia { video, audio })
    }

    fn open_audio(&self, path: &Path) -> Result<AudioStream> {
        let supported = AudioLoader::detect_format(path)
            .map_or(false, |ext| AudioLoader::is_format_supported(&ext));
        if supported {
            AudioLoader::load(path)
        } else {
            self.decode_audio(path)
        }
    }
}

fn decode_failed(path: &Path, reason: impl Into<String>) -> crate::error::CompositorError {
    VideoError::DecodeFailed {
        path: path.display().to_string(),
        reason: reason.into(),
    }
    .into()
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
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
    duration: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Probe {
    width: u32,
    height: u32,
    fps: f64,
    duration: f64,
    declared_frames: Option<usize>,
    has_audio: bool,
}

impl ProbeReport {
    fn into_probe(self, path: &Path) -> Result<Probe> {
        let has_audio = self
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));
        let video = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| decode_failed(path, "no video stream"))?;

        let (width, height) = match (video.width, video.height) {
            (Some(w), Some(h)) => (w, h),
            _ => return Err(decode_failed(path, "video stream has no dimensions")),
        };

        let fps = video
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
            .ok_or_else(|| decode_failed(path, "video stream has no frame rate"))?;

        let duration = video
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .or_else(|| {
                self.format
                    .as_ref()
                    .and_then(|f| f.duration.as_deref())
                    .and_then(|d| d.parse::<f64>().ok())
            })
            .ok_or_else(|| decode_failed(path, "unknown duration"))?;

        let declared_frames = video.nb_frames.as_deref().and_then(|n| n.parse().ok());

        Ok(Probe {
            width,
            height,
            fps,
            duration,
            declared_frames,
            has_audio,
        })
    }
}

/// Parse ffprobe's `num/den` rates
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[derive(Default)]
struct PipeState {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    next_index: usize,
    last: Option<(usize, Frame)>,
}

impl Drop for PipeState {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Pulls raw rgb24 frames from a long-lived ffmpeg process
///
/// Sequential reads reuse the running process; backwards or far-forward
/// requests restart it with an input seek.
struct PipeFrameSource {
    path: PathBuf,
    info: StreamInfo,
    state: Mutex<PipeState>,
}

impl PipeFrameSource {
    fn spawn_at(&self, state: &mut PipeState, index: usize) -> Result<()> {
        if let Some(mut child) = state.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }

        let start = index as f64 / self.info.fps;
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-ss", &format!("{:.6}", start), "-i"])
            .arg(&self.path)
            .args([
                "-an",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-vsync",
                "cfr",
                "-r",
                &self.info.fps.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| decode_failed(&self.path, format!("ffmpeg failed to start: {}", e)))?;

        state.stdout = child.stdout.take();
        state.child = Some(child);
        state.next_index = index;
        // A frame from before the seek must never stand in for one after it
        state.last = None;
        Ok(())
    }

    fn read_next(&self, state: &mut PipeState) -> Result<Option<Frame>> {
        let stdout = match state.stdout.as_mut() {
            Some(stdout) => stdout,
            None => return Ok(None),
        };

        let len = self.info.width as usize * self.info.height as usize * 3;
        let mut buffer = vec![0u8; len];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                state.next_index += 1;
                Ok(Frame::from_rgb_bytes(self.info.width, self.info.height, buffer))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(decode_failed(&self.path, format!("reading frames: {}", e))),
        }
    }
}

impl FrameSource<Frame> for PipeFrameSource {
    fn frame(&self, index: usize) -> Result<Frame> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| decode_failed(&self.path, "decoder state poisoned"))?;

        if let Some((last_index, frame)) = &state.last {
            if *last_index == index {
                return Ok(frame.clone());
            }
        }

        let needs_seek = state.child.is_none()
            || index < state.next_index
            || index > state.next_index + MAX_FORWARD_SKIP;
        if needs_seek {
            self.spawn_at(&mut state, index)?;
        }

        while state.next_index <= index {
            let current = state.next_index;
            match self.read_next(&mut state)? {
                Some(frame) => {
                    if current == index {
                        state.last = Some((index, frame.clone()));
                        return Ok(frame);
                    }
                    state.last = Some((current, frame));
                }
                None => {
                    // Container durations overshoot the real frame count by a frame or two
                    if let Some((last_index, frame)) = &state.last {
                        warn!(
                            "{} ended at frame {}, holding it for frame {}",
                            self.path.display(),
                            last_index,
                            index
                        );
                        return Ok(frame.clone());
                    }
                    return Err(decode_failed(
                        &self.path,
                        format!("no frame available at index {}", index),
                    ));
                }
            }
        }

        Err(decode_failed(&self.path, format!("frame {} was skipped", index)))
    }
}
