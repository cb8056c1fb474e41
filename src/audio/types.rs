use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// Sample rate and channel layout shared by every track in a mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

impl AudioFormat {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(AudioError::InvalidParameters {
                details: format!(
                    "sample rate and channel count must be non-zero, got {} Hz / {} channels",
                    self.sample_rate, self.channels
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Number of sample frames covering `duration` seconds
    pub fn frames_for(&self, duration: f64) -> usize {
        if !duration.is_finite() || duration <= 0.0 {
            return 0;
        }
        (duration * self.sample_rate as f64).round() as usize
    }
}

/// Decoded, immutable PCM audio
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`; cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct AudioStream {
    samples: Arc<[f32]>,
    format: AudioFormat,
}

impl AudioStream {
    /// Wrap interleaved samples, rejecting inconsistent metadata
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        let format = AudioFormat { sample_rate, channels };
        format.validate()?;

        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidParameters {
                details: format!(
                    "{} samples do not divide into {} channels",
                    samples.len(),
                    channels
                ),
            }
            .into());
        }
        if let Some(position) = samples.iter().position(|s| !s.is_finite()) {
            return Err(AudioError::InvalidParameters {
                details: format!("non-finite sample at position {}", position),
            }
            .into());
        }

        Ok(Self {
            samples: samples.into(),
            format,
        })
    }

    /// `duration` seconds of digital silence
    pub fn silence(format: AudioFormat, duration: f64) -> Self {
        let len = format.frames_for(duration) * format.channels as usize;
        Self {
            samples: vec![0.0; len].into(),
            format,
        }
    }

    fn from_parts(samples: Vec<f32>, format: AudioFormat) -> Self {
        Self {
            samples: samples.into(),
            format,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of sample frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.format.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.format.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample for one channel of one frame; silence outside the stream
    pub fn sample_at(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.format.channels as usize;
        if channel >= channels {
            return 0.0;
        }
        self.samples
            .get(frame * channels + channel)
            .copied()
            .unwrap_or(0.0)
    }

    fn frames(&self, start: usize, end: usize) -> &[f32] {
        let channels = self.format.channels as usize;
        let end = end.min(self.frame_count());
        let start = start.min(end);
        &self.samples[start * channels..end * channels]
    }

    /// The part between `start` and `end` seconds, clamped to the stream
    pub fn subrange(&self, start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < start {
            return Err(AudioError::InvalidParameters {
                details: format!("invalid audio range [{}, {})", start, end),
            }
            .into());
        }
        let first = self.format.frames_for(start);
        let last = self.format.frames_for(end);
        Ok(Self::from_parts(self.frames(first, last).to_vec(), self.format))
    }

    /// `self` followed by `other`; formats must match, nothing is resampled
    pub fn concat(&self, other: &Self) -> Result<Self> {
        if self.format != other.format {
            return Err(AudioError::FormatMismatch {
                details: format!("cannot concatenate {:?} with {:?}", self.format, other.format),
            }
            .into());
        }
        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&other.samples);
        Ok(Self::from_parts(samples, self.format))
    }

    /// Repeat end-to-start and cut at exactly `duration` seconds
    ///
    /// The loop point is a hard cut. An empty stream loops into silence.
    pub fn looped_to(&self, duration: f64) -> Self {
        let target = self.format.frames_for(duration) * self.format.channels as usize;
        if self.samples.is_empty() {
            return Self::silence(self.format, duration);
        }
        let samples = self.samples.iter().copied().cycle().take(target).collect();
        Self::from_parts(samples, self.format)
    }

    /// First `duration` seconds, padded with silence if the stream is shorter
    pub fn trimmed_to(&self, duration: f64) -> Self {
        let frames = self.format.frames_for(duration);
        let mut samples = self.frames(0, frames).to_vec();
        samples.resize(frames * self.format.channels as usize, 0.0);
        Self::from_parts(samples, self.format)
    }

    /// Loop when shorter than `duration`, keep the prefix when longer
    pub fn fit_to(&self, duration: f64) -> Self {
        if self.frame_count() < self.format.frames_for(duration) {
            self.looped_to(duration)
        } else {
            self.trimmed_to(duration)
        }
    }

    /// Multiply every sample by a linear gain
    pub fn with_gain(&self, gain: f32) -> Self {
        let samples = self.samples.iter().map(|s| s * gain).collect();
        Self::from_parts(samples, self.format)
    }

    /// Change the sample rate with linear interpolation
    pub fn resampled(&self, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidParameters {
                details: "target sample rate must be non-zero".to_string(),
            }
            .into());
        }
        if sample_rate == self.format.sample_rate {
            return Ok(self.clone());
        }

        let channels = self.format.channels as usize;
        let source_frames = self.frame_count();
        let target_frames = (source_frames as f64 * sample_rate as f64
            / self.format.sample_rate as f64)
            .round() as usize;
        let step = self.format.sample_rate as f64 / sample_rate as f64;

        let mut samples = Vec::with_capacity(target_frames * channels);
        for frame in 0..target_frames {
            let position = frame as f64 * step;
            let index = position.floor() as usize;
            let fraction = (position - index as f64) as f32;
            for channel in 0..channels {
                let a = self.sample_at(index, channel);
                let b = if index + 1 < source_frames {
                    self.sample_at(index + 1, channel)
                } else {
                    a
                };
                samples.push(a + (b - a) * fraction);
            }
        }

        Ok(Self::from_parts(
            samples,
            AudioFormat {
                sample_rate,
                channels: self.format.channels,
            },
        ))
    }

    /// Up-mix mono by duplication or down-mix to mono by averaging
    pub fn with_channels(&self, channels: u16) -> Result<Self> {
        let from = self.format.channels;
        if channels == from {
            return Ok(self.clone());
        }
        let format = AudioFormat {
            sample_rate: self.format.sample_rate,
            channels,
        };

        let samples: Vec<f32> = if from == 1 && channels > 0 {
            self.samples
                .iter()
                .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
                .collect()
        } else if channels == 1 {
            self.samples
                .chunks_exact(from as usize)
                .map(|chunk| chunk.iter().sum::<f32>() / from as f32)
                .collect()
        } else {
            return Err(AudioError::FormatMismatch {
                details: format!("cannot convert {} channels to {}", from, channels),
            }
            .into());
        };

        Ok(Self::from_parts(samples, format))
    }

    /// Resample and remix into `format`
    pub fn converted(&self, format: AudioFormat) -> Result<Self> {
        format.validate()?;
        self.resampled(format.sample_rate)?.with_channels(format.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, rate: u32) -> AudioStream {
        AudioStream::new((0..frames).map(|i| i as f32 / frames as f32).collect(), rate, 1).unwrap()
    }

    #[test]
    fn test_invalid_streams_rejected() {
        assert!(AudioStream::new(vec![0.0; 3], 44_100, 2).is_err());
        assert!(AudioStream::new(vec![0.0; 2], 0, 2).is_err());
        assert!(AudioStream::new(vec![0.0, f32::NAN], 44_100, 1).is_err());
        assert!(AudioStream::new(Vec::new(), 44_100, 2).is_ok());
    }

    #[test]
    fn test_duration_and_silence() {
        let format = AudioFormat { sample_rate: 1000, channels: 2 };
        let silence = AudioStream::silence(format, 1.5);
        assert_eq!(silence.frame_count(), 1500);
        assert_eq!(silence.samples().len(), 3000);
        assert_eq!(silence.duration(), 1.5);
    }

    #[test]
    fn test_looped_to_repeats_source() {
        let source = AudioStream::new(vec![0.1, 0.2, 0.3], 10, 1).unwrap();
        let looped = source.looped_to(0.8);
        assert_eq!(looped.samples(), &[0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1, 0.2]);
    }

    #[test]
    fn test_fit_to_trims_long_sources() {
        let source = ramp(400, 10);
        let fitted = source.fit_to(25.0);
        assert_eq!(fitted.frame_count(), 250);
        assert_eq!(fitted.samples(), &source.samples()[..250]);
    }

    #[test]
    fn test_subrange_and_concat() {
        let source = ramp(100, 10);
        let head = source.subrange(0.0, 2.0).unwrap();
        let tail = source.subrange(2.0, 20.0).unwrap();
        assert_eq!(head.frame_count(), 20);
        assert_eq!(tail.frame_count(), 80);
        assert_eq!(head.concat(&tail).unwrap().samples(), source.samples());

        let stereo = AudioStream::silence(AudioFormat { sample_rate: 10, channels: 2 }, 1.0);
        assert!(head.concat(&stereo).is_err());
        assert!(source.subrange(3.0, 1.0).is_err());
    }

    #[test]
    fn test_channel_conversion() {
        let mono = AudioStream::new(vec![0.5, -0.5], 100, 1).unwrap();
        let stereo = mono.with_channels(2).unwrap();
        assert_eq!(stereo.samples(), &[0.5, 0.5, -0.5, -0.5]);

        let stereo = AudioStream::new(vec![1.0, 0.0, 0.2, 0.4], 100, 2).unwrap();
        let down = stereo.with_channels(1).unwrap();
        assert_eq!(down.samples(), &[0.5, 0.3]);

        let surround = AudioStream::new(vec![0.0; 6], 100, 6).unwrap();
        assert!(surround.with_channels(2).is_err());
    }

    #[test]
    fn test_resample_keeps_duration() {
        let source = ramp(48_000, 48_000);
        let resampled = source.resampled(44_100).unwrap();
        assert_eq!(resampled.frame_count(), 44_100);
        assert!((resampled.duration() - source.duration()).abs() < 1e-9);

        // Linear interpolation halfway between samples
        let up = AudioStream::new(vec![0.0, 1.0], 1, 1).unwrap().resampled(2).unwrap();
        assert_eq!(up.samples(), &[0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_gain_and_sample_at() {
        let source = AudioStream::new(vec![0.5, -0.25], 100, 2).unwrap();
        let quiet = source.with_gain(0.5);
        assert_eq!(quiet.sample_at(0, 0), 0.25);
        assert_eq!(quiet.sample_at(0, 1), -0.125);
        assert_eq!(quiet.sample_at(5, 0), 0.0);
        assert_eq!(quiet.sample_at(0, 2), 0.0);
    }
}
