//! Time-indexed, immutable frame sequences.
//!
//! A [`Stream`] is a cheap handle (`Arc` inside) over a frame source plus the
//! metadata every consumer relies on: pixel size, frame rate and frame count.
//! Transforms such as [`Stream::map`] or [`Stream::looped`] build a new
//! handle around the old one; nothing is rendered until a frame is pulled.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, Matte, Raster};

/// Slack, in frames, tolerated between a declared duration and `frame_count / fps`
const DURATION_TOLERANCE_FRAMES: f64 = 1.0;

/// Color frames over time
pub type FrameStream = Stream<Frame>;

/// Single-channel opacity frames over time
pub type MatteStream = Stream<Matte>;

/// Validated stream metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: usize,
}

impl StreamInfo {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VideoError::InvalidParameters {
                details: format!("stream size must be non-zero, got {}x{}", width, height),
            }
            .into());
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(VideoError::InvalidParameters {
                details: format!("stream fps must be finite and positive, got {}", fps),
            }
            .into());
        }
        if frame_count == 0 {
            return Err(VideoError::InvalidParameters {
                details: "stream must contain at least one frame".to_string(),
            }
            .into());
        }

        Ok(Self { width, height, fps, frame_count })
    }

    /// Metadata for a stream that declares its duration rather than its frame count
    ///
    /// Rejects a declared count that disagrees with `duration * fps` by more
    /// than one frame.
    pub fn from_duration(
        width: u32,
        height: u32,
        fps: f64,
        duration: f64,
        declared_frames: Option<usize>,
    ) -> Result<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(VideoError::InvalidParameters {
                details: format!("stream duration must be finite and positive, got {}", duration),
            }
            .into());
        }
        let expected = frames_for_duration(duration, fps);
        if let Some(declared) = declared_frames {
            if (declared as f64 - duration * fps).abs() > DURATION_TOLERANCE_FRAMES + 0.5 {
                return Err(VideoError::InvalidParameters {
                    details: format!(
                        "declared {} frames but {:.3}s at {:.3} fps implies {}",
                        declared, duration, fps, expected
                    ),
                }
                .into());
            }
        }
        Self::new(width, height, fps, expected.max(1))
    }

    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frame index shown at `t` seconds, held at both ends
    pub fn index_at(&self, t: f64) -> usize {
        if !t.is_finite() || t <= 0.0 {
            return 0;
        }
        // Small epsilon so t = i / fps lands on frame i despite float error
        let index = (t * self.fps + 1e-6).floor() as usize;
        index.min(self.frame_count - 1)
    }
}

/// Number of frames covering `duration` seconds at `fps`
pub fn frames_for_duration(duration: f64, fps: f64) -> usize {
    if !duration.is_finite() || duration <= 0.0 || !fps.is_finite() || fps <= 0.0 {
        return 0;
    }
    (duration * fps).round() as usize
}

/// Half-open span `[start, end)` on the output timeline, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(VideoError::InvalidParameters {
                details: format!("invalid time window [{}, {})", start, end),
            }
            .into());
        }
        Ok(Self { start, end })
    }

    /// `[0, duration)`
    pub fn full(duration: f64) -> Result<Self> {
        Self::new(0.0, duration)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// True when the window ends no later than `duration` (half a microsecond of slack)
    pub fn fits_within(&self, duration: f64) -> bool {
        self.end <= duration + 5e-7
    }
}

/// Produces the frame at a given index
///
/// Implementations must be pure with respect to the index: asking twice
/// for the same index yields the same pixels.
pub trait FrameSource<T>: Send + Sync {
    fn frame(&self, index: usize) -> Result<T>;
}

/// Immutable handle over a validated frame source
pub struct Stream<T> {
    info: StreamInfo,
    source: Arc<dyn FrameSource<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            info: self.info,
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("info", &self.info).finish()
    }
}

impl<T: Raster> Stream<T> {
    /// Wrap any source; every frame it yields is checked against `info`
    pub fn new(info: StreamInfo, source: Arc<dyn FrameSource<T>>) -> Self {
        Self { info, source }
    }

    /// In-memory stream over already decoded frames
    pub fn from_frames(frames: Vec<T>, fps: f64) -> Result<Self> {
        let first = frames.first().ok_or_else(|| VideoError::InvalidParameters {
            details: "stream must contain at least one frame".to_string(),
        })?;
        let (width, height) = first.dimensions();

        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.dimensions() != (width, height))
        {
            let (w, h) = frame.dimensions();
            return Err(VideoError::DimensionMismatch {
                details: format!("frame {} is {}x{}, stream is {}x{}", index, w, h, width, height),
            }
            .into());
        }

        let info = StreamInfo::new(width, height, fps, frames.len())?;
        Ok(Self::new(info, Arc::new(FrameList { frames: frames.into() })))
    }

    /// The same picture held for `duration` seconds
    pub fn still(frame: T, fps: f64, duration: f64) -> Result<Self> {
        let (width, height) = frame.dimensions();
        let info = StreamInfo::from_duration(width, height, fps, duration, None)?;
        Ok(Self::new(info, Arc::new(Still { frame })))
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    pub fn frame_count(&self) -> usize {
        self.info.frame_count
    }

    pub fn duration(&self) -> f64 {
        self.info.duration()
    }

    /// Pull one frame by index
    pub fn frame(&self, index: usize) -> Result<T> {
        if index >= self.info.frame_count {
            return Err(VideoError::InvalidParameters {
                details: format!(
                    "frame index {} out of range for stream of {} frames",
                    index, self.info.frame_count
                ),
            }
            .into());
        }

        let frame = self.source.frame(index)?;
        if frame.dimensions() != self.info.size() {
            let (w, h) = frame.dimensions();
            return Err(VideoError::DimensionMismatch {
                details: format!(
                    "source produced {}x{} at frame {}, stream is {}x{}",
                    w, h, index, self.info.width, self.info.height
                ),
            }
            .into());
        }
        Ok(frame)
    }

    /// Frame shown at `t` seconds (held-frame semantics outside the stream)
    pub fn sample(&self, t: f64) -> Result<T> {
        self.frame(self.info.index_at(t))
    }

    /// Apply a pure per-frame transform, producing frames of `width`x`height`
    pub fn map<U, F>(&self, width: u32, height: u32, f: F) -> Result<Stream<U>>
    where
        U: Raster,
        F: Fn(&T) -> Result<U> + Send + Sync + 'static,
    {
        let info = StreamInfo::new(width, height, self.info.fps, self.info.frame_count)?;
        Ok(Stream::new(
            info,
            Arc::new(Mapped { inner: self.clone(), f }),
        ))
    }

    /// Same-size per-frame transform
    pub fn map_frames<F>(&self, f: F) -> Stream<T>
    where
        F: Fn(&T) -> Result<T> + Send + Sync + 'static,
    {
        Stream::new(self.info, Arc::new(Mapped { inner: self.clone(), f }))
    }

    /// Resample every frame to an exact size
    pub fn resized(&self, width: u32, height: u32) -> Result<Self> {
        if self.info.size() == (width, height) {
            return Ok(self.clone());
        }
        self.map(width, height, move |frame: &T| Ok(frame.resized(width, height)))
    }

    /// Uniformly scale so the width becomes `width`
    pub fn scaled_to_width(&self, width: u32) -> Result<Self> {
        let height = scaled_dimension(self.info.height, width, self.info.width);
        self.resized(width, height)
    }

    /// Keep only the given rectangle of every frame
    pub fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        let fits = x.checked_add(width).map_or(false, |r| r <= self.info.width)
            && y.checked_add(height).map_or(false, |b| b <= self.info.height);
        if !fits {
            return Err(VideoError::InvalidParameters {
                details: format!(
                    "crop {}x{}+{}+{} exceeds {}x{} stream",
                    width, height, x, y, self.info.width, self.info.height
                ),
            }
            .into());
        }
        self.map(width, height, move |frame: &T| Ok(frame.cropped(x, y, width, height)))
    }

    /// Repeat the stream end-to-start until it lasts exactly `duration`
    ///
    /// Also truncates when the stream is already longer. Never shorter than
    /// one frame, even when `duration` is under half a frame.
    pub fn looped(&self, duration: f64) -> Result<Self> {
        check_duration(duration)?;
        let frame_count = frames_for_duration(duration, self.info.fps).max(1);
        let info = StreamInfo::new(self.info.width, self.info.height, self.info.fps, frame_count)?;
        Ok(Self::new(info, Arc::new(Looped { inner: self.clone() })))
    }

    /// Keep the first `duration` seconds (held last frame if longer than the stream)
    pub fn trimmed(&self, duration: f64) -> Result<Self> {
        check_duration(duration)?;
        let frame_count = frames_for_duration(duration, self.info.fps).max(1);
        if frame_count == self.info.frame_count {
            return Ok(self.clone());
        }
        let info = StreamInfo::new(self.info.width, self.info.height, self.info.fps, frame_count)?;
        Ok(Self::new(info, Arc::new(Held { inner: self.clone() })))
    }

    /// Same picture timeline at a different frame rate (frames repeated or dropped)
    pub fn retimed(&self, fps: f64) -> Result<Self> {
        if (fps - self.info.fps).abs() < 1e-9 {
            return Ok(self.clone());
        }
        let frame_count = frames_for_duration(self.duration(), fps).max(1);
        let info = StreamInfo::new(self.info.width, self.info.height, fps, frame_count)?;
        Ok(Self::new(info, Arc::new(Retimed { inner: self.clone(), fps })))
    }

    /// Play `other` after `self`; both must share size and frame rate
    pub fn concat(&self, other: &Self) -> Result<Self> {
        if self.info.size() != other.info.size() {
            return Err(VideoError::DimensionMismatch {
                details: format!(
                    "cannot concatenate {}x{} with {}x{}",
                    self.info.width, self.info.height, other.info.width, other.info.height
                ),
            }
            .into());
        }
        if (self.info.fps - other.info.fps).abs() > 1e-6 {
            return Err(VideoError::InvalidParameters {
                details: format!(
                    "cannot concatenate {:.3} fps with {:.3} fps",
                    self.info.fps, other.info.fps
                ),
            }
            .into());
        }

        let info = StreamInfo::new(
            self.info.width,
            self.info.height,
            self.info.fps,
            self.info.frame_count + other.info.frame_count,
        )?;
        Ok(Self::new(
            info,
            Arc::new(Concat { head: self.clone(), tail: other.clone() }),
        ))
    }
}

fn check_duration(duration: f64) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(VideoError::InvalidParameters {
            details: format!("duration must be finite and positive, got {}", duration),
        }
        .into());
    }
    Ok(())
}

/// `source * target / reference`, rounded and never zero
pub fn scaled_dimension(source: u32, target: u32, reference: u32) -> u32 {
    let scaled = (source as u64 * target as u64 + reference as u64 / 2) / reference.max(1) as u64;
    scaled.max(1) as u32
}

struct FrameList<T> {
    frames: Arc<[T]>,
}

impl<T: Raster> FrameSource<T> for FrameList<T> {
    fn frame(&self, index: usize) -> Result<T> {
        Ok(self.frames[index].clone())
    }
}

struct Still<T> {
    frame: T,
}

impl<T: Raster> FrameSource<T> for Still<T> {
    fn frame(&self, _index: usize) -> Result<T> {
        Ok(self.frame.clone())
    }
}

struct Mapped<T, F> {
    inner: Stream<T>,
    f: F,
}

impl<T, U, F> FrameSource<U> for Mapped<T, F>
where
    T: Raster,
    F: Fn(&T) -> Result<U> + Send + Sync,
{
    fn frame(&self, index: usize) -> Result<U> {
        let frame = self.inner.frame(index)?;
        (self.f)(&frame)
    }
}

struct Looped<T> {
    inner: Stream<T>,
}

impl<T: Raster> FrameSource<T> for Looped<T> {
    fn frame(&self, index: usize) -> Result<T> {
        self.inner.frame(index % self.inner.frame_count())
    }
}

struct Held<T> {
    inner: Stream<T>,
}

impl<T: Raster> FrameSource<T> for Held<T> {
    fn frame(&self, index: usize) -> Result<T> {
        self.inner.frame(index.min(self.inner.frame_count() - 1))
    }
}

struct Retimed<T> {
    inner: Stream<T>,
    fps: f64,
}

impl<T: Raster> FrameSource<T> for Retimed<T> {
    fn frame(&self, index: usize) -> Result<T> {
        self.inner.sample(index as f64 / self.fps)
    }
}

struct Concat<T> {
    head: Stream<T>,
    tail: Stream<T>,
}

impl<T: Raster> FrameSource<T> for Concat<T> {
    fn frame(&self, index: usize) -> Result<T> {
        let split = self.head.frame_count();
        if index < split {
            self.head.frame(index)
        } else {
            self.tail.frame(index - split)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: u8, fps: f64) -> FrameStream {
        let frames = (0..count).map(|i| Frame::new_filled(4, 2, [i, 0, 0])).collect();
        FrameStream::from_frames(frames, fps).unwrap()
    }

    #[test]
    fn test_duration_matches_frame_count() {
        let stream = numbered(30, 30.0);
        assert_eq!(stream.frame_count(), 30);
        assert!((stream.duration() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_holds_at_boundaries() {
        let stream = numbered(10, 10.0);
        assert_eq!(stream.sample(-1.0).unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(stream.sample(0.3).unwrap().get_pixel(0, 0)[0], 3);
        assert_eq!(stream.sample(0.99).unwrap().get_pixel(0, 0)[0], 9);
        assert_eq!(stream.sample(5.0).unwrap().get_pixel(0, 0)[0], 9);
    }

    #[test]
    fn test_inconsistent_frames_rejected() {
        let frames = vec![Frame::new_black(4, 2), Frame::new_black(2, 4)];
        let err = FrameStream::from_frames(frames, 30.0).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(VideoError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_metadata_rejected() {
        assert!(StreamInfo::new(0, 10, 30.0, 1).is_err());
        assert!(StreamInfo::new(10, 10, 0.0, 1).is_err());
        assert!(StreamInfo::new(10, 10, f64::NAN, 1).is_err());
        assert!(StreamInfo::new(10, 10, 30.0, 0).is_err());
        assert!(StreamInfo::from_duration(10, 10, 30.0, -1.0, None).is_err());
        assert!(StreamInfo::from_duration(10, 10, 30.0, 10.0, Some(200)).is_err());
        assert_eq!(
            StreamInfo::from_duration(10, 10, 30.0, 10.0, Some(301)).unwrap().frame_count,
            300
        );
    }

    #[test]
    fn test_looped_wraps_and_truncates() {
        let stream = numbered(4, 10.0);
        let looped = stream.looped(1.0).unwrap();
        assert_eq!(looped.frame_count(), 10);
        let reds: Vec<u8> = (0..10).map(|i| looped.frame(i).unwrap().get_pixel(0, 0)[0]).collect();
        assert_eq!(reds, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);

        let shorter = stream.looped(0.2).unwrap();
        assert_eq!(shorter.frame_count(), 2);
    }

    #[test]
    fn test_sub_frame_durations_keep_one_frame() {
        // One 60 fps frame is less than half a frame at 24 fps
        let reaction = numbered(4, 24.0);
        let looped = reaction.looped(1.0 / 60.0).unwrap();
        assert_eq!(looped.frame_count(), 1);
        assert_eq!(looped.frame(0).unwrap().get_pixel(0, 0)[0], 0);

        assert_eq!(reaction.trimmed(0.01).unwrap().frame_count(), 1);
        assert!(reaction.looped(0.0).is_err());
        assert!(reaction.trimmed(f64::NAN).is_err());
    }

    #[test]
    fn test_trimmed_and_concat() {
        let a = numbered(5, 10.0);
        let b = numbered(3, 10.0);
        let joined = a.trimmed(0.2).unwrap().concat(&b).unwrap();
        assert_eq!(joined.frame_count(), 5);
        assert_eq!(joined.frame(1).unwrap().get_pixel(0, 0)[0], 1);
        assert_eq!(joined.frame(2).unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(joined.frame(4).unwrap().get_pixel(0, 0)[0], 2);

        let other_rate = numbered(3, 25.0);
        assert!(a.concat(&other_rate).is_err());
    }

    #[test]
    fn test_retimed_keeps_duration() {
        let stream = numbered(10, 10.0);
        let faster = stream.retimed(30.0).unwrap();
        assert_eq!(faster.frame_count(), 30);
        assert_eq!(faster.frame(4).unwrap().get_pixel(0, 0)[0], 1);
        assert_eq!(faster.frame(29).unwrap().get_pixel(0, 0)[0], 9);

        let slower = stream.retimed(5.0).unwrap();
        assert_eq!(slower.frame_count(), 5);
        assert_eq!(slower.frame(1).unwrap().get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn test_map_checks_declared_size() {
        let stream = numbered(2, 10.0);
        let liar = stream.map(8, 8, |frame: &Frame| Ok(frame.clone())).unwrap();
        assert!(liar.frame(0).is_err());
        assert!(stream.frame(2).is_err());
    }

    #[test]
    fn test_time_window() {
        let window = TimeWindow::new(2.0, 4.0).unwrap();
        assert!(window.contains(2.0));
        assert!(window.contains(3.999));
        assert!(!window.contains(4.0));
        assert_eq!(window.duration(), 2.0);
        assert!(window.fits_within(4.0));
        assert!(!window.fits_within(3.5));

        assert!(TimeWindow::new(3.0, 3.0).is_err());
        assert!(TimeWindow::new(-1.0, 3.0).is_err());
        assert!(TimeWindow::full(f64::NAN).is_err());
    }

    #[test]
    fn test_scaling_and_crop() {
        let frames = vec![Frame::new_black(1280, 720)];
        let stream = FrameStream::from_frames(frames, 30.0).unwrap();
        let scaled = stream.scaled_to_width(400).unwrap();
        assert_eq!(scaled.info().size(), (400, 225));
        assert_eq!(scaled.frame(0).unwrap().dimensions(), (400, 225));

        let cropped = stream.cropped(0, 0, 1280, 670).unwrap();
        assert_eq!(cropped.frame(0).unwrap().dimensions(), (1280, 670));
        assert!(stream.cropped(10, 0, 1280, 720).is_err());
    }
}
