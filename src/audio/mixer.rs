//! Duration-exact mixing of looped or trimmed tracks.

use tracing::{debug, warn};

use crate::audio::types::{AudioFormat, AudioStream};
use crate::error::{AudioError, Result};
use crate::video::TimeWindow;

/// One input to the mix
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub source: AudioStream,

    /// Linear gain applied after the track has been fitted to its window
    pub volume: f32,

    /// Where the track plays; the whole mix when absent
    pub window: Option<TimeWindow>,
}

impl AudioTrack {
    pub fn new(source: AudioStream, volume: f32) -> Result<Self> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(AudioError::InvalidParameters {
                details: format!("track volume must be finite and non-negative, got {}", volume),
            }
            .into());
        }
        Ok(Self {
            source,
            volume,
            window: None,
        })
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }
}

/// Sums tracks into one stream of an exact duration
///
/// Every track is converted to the mixer's format, looped when shorter than
/// its window, trimmed when longer, scaled by its volume and added. The sum
/// is saturated to `[-1, 1]`; gains are the caller's responsibility, so
/// clipping is reported rather than normalized away.
#[derive(Debug, Clone, Copy)]
pub struct AudioMixer {
    format: AudioFormat,
}

impl AudioMixer {
    pub fn new(format: AudioFormat) -> Result<Self> {
        format.validate()?;
        Ok(Self { format })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn mix(&self, tracks: &[AudioTrack], duration: f64) -> Result<AudioStream> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(AudioError::InvalidParameters {
                details: format!("mix duration must be finite and positive, got {}", duration),
            }
            .into());
        }

        let channels = self.format.channels as usize;
        let total_frames = self.format.frames_for(duration);
        let mut mixed = vec![0.0f32; total_frames * channels];

        for (index, track) in tracks.iter().enumerate() {
            let window = match track.window {
                Some(window) => window,
                None => TimeWindow::full(duration)?,
            };
            if !window.fits_within(duration) {
                return Err(AudioError::InvalidParameters {
                    details: format!(
                        "track {} window [{}, {}) exceeds mix duration {}",
                        index, window.start, window.end, duration
                    ),
                }
                .into());
            }

            let fitted = track.source.converted(self.format)?.fit_to(window.duration());
            let offset = self.format.frames_for(window.start) * channels;
            debug!(
                "Mixing track {}: {:.2}s source into [{:.2}, {:.2}) at volume {}",
                index,
                track.source.duration(),
                window.start,
                window.end,
                track.volume
            );

            for (out, sample) in mixed
                .iter_mut()
                .skip(offset)
                .zip(fitted.samples().iter())
            {
                *out += sample * track.volume;
            }
        }

        let mut clipped = 0usize;
        for sample in mixed.iter_mut() {
            if sample.abs() > 1.0 {
                clipped += 1;
                *sample = sample.clamp(-1.0, 1.0);
            }
        }
        if clipped > 0 {
            warn!(
                "{} of {} mixed samples clipped; lower the track volumes",
                clipped,
                mixed.len()
            );
        }

        AudioStream::new(mixed, self.format.sample_rate, self.format.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1_000;

    fn mono() -> AudioFormat {
        AudioFormat { sample_rate: RATE, channels: 1 }
    }

    /// Sample `i` holds `i / len`, so position inside the source is recoverable
    fn ramp(seconds: f64) -> AudioStream {
        let frames = (seconds * RATE as f64) as usize;
        let samples = (0..frames).map(|i| i as f32 / frames as f32).collect();
        AudioStream::new(samples, RATE, 1).unwrap()
    }

    #[test]
    fn test_short_source_loops_to_exact_duration() {
        let source = ramp(10.0);
        let mixer = AudioMixer::new(mono()).unwrap();
        let mixed = mixer.mix(&[AudioTrack::new(source.clone(), 1.0).unwrap()], 25.0).unwrap();

        assert_eq!(mixed.duration(), 25.0);
        assert_eq!(mixed.frame_count(), 25_000);
        // 12.5s into the mix is 2.5s into the second copy
        assert_eq!(mixed.sample_at(12_500, 0), source.sample_at(2_500, 0));
        assert_eq!(mixed.sample_at(20_000, 0), 0.0);
    }

    #[test]
    fn test_long_source_is_trimmed_to_prefix() {
        let source = ramp(40.0);
        let mixer = AudioMixer::new(mono()).unwrap();
        let mixed = mixer.mix(&[AudioTrack::new(source.clone(), 1.0).unwrap()], 25.0).unwrap();

        assert_eq!(mixed.duration(), 25.0);
        assert_eq!(mixed.samples(), &source.samples()[..25_000]);
    }

    #[test]
    fn test_volumes_apply_and_sum() {
        let format = mono();
        let ones = AudioStream::new(vec![1.0; 2_000], RATE, 1).unwrap();
        let halves = AudioStream::new(vec![0.5; 500], RATE, 1).unwrap();

        let tracks = [
            AudioTrack::new(ones, 0.4).unwrap(),
            AudioTrack::new(halves, 0.8).unwrap(),
        ];
        let mixed = AudioMixer::new(format).unwrap().mix(&tracks, 1.0).unwrap();
        for &sample in mixed.samples() {
            assert!((sample - 0.8).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sum_saturates() {
        let loud = AudioStream::new(vec![0.9; 100], RATE, 1).unwrap();
        let tracks = [
            AudioTrack::new(loud.clone(), 1.0).unwrap(),
            AudioTrack::new(loud, 1.0).unwrap(),
        ];
        let mixed = AudioMixer::new(mono()).unwrap().mix(&tracks, 0.1).unwrap();
        assert!(mixed.samples().iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_windowed_track_starts_late() {
        let ones = AudioStream::new(vec![1.0; 100], RATE, 1).unwrap();
        let track = AudioTrack::new(ones, 1.0)
            .unwrap()
            .with_window(TimeWindow::new(0.5, 1.0).unwrap());
        let mixed = AudioMixer::new(mono()).unwrap().mix(&[track], 1.0).unwrap();

        assert_eq!(mixed.sample_at(499, 0), 0.0);
        assert_eq!(mixed.sample_at(500, 0), 1.0);
        assert_eq!(mixed.sample_at(999, 0), 1.0);
    }

    #[test]
    fn test_tracks_are_converted_to_mix_format() {
        let stereo = AudioFormat { sample_rate: 2_000, channels: 2 };
        let mono_source = AudioStream::new(vec![0.25; 1_000], RATE, 1).unwrap();
        let mixed = AudioMixer::new(stereo)
            .unwrap()
            .mix(&[AudioTrack::new(mono_source, 1.0).unwrap()], 1.0)
            .unwrap();
        assert_eq!(mixed.channels(), 2);
        assert_eq!(mixed.frame_count(), 2_000);
        assert_eq!(mixed.sample_at(1_999, 1), 0.25);
    }

    #[test]
    fn test_invalid_inputs() {
        let mixer = AudioMixer::new(mono()).unwrap();
        assert!(mixer.mix(&[], -1.0).is_err());
        assert!(mixer.mix(&[], f64::NAN).is_err());
        assert!(AudioTrack::new(ramp(1.0), -0.5).is_err());

        let late = AudioTrack::new(ramp(1.0), 1.0)
            .unwrap()
            .with_window(TimeWindow::new(0.5, 3.0).unwrap());
        assert!(mixer.mix(&[late], 2.0).is_err());

        let empty = mixer.mix(&[], 2.0).unwrap();
        assert_eq!(empty.duration(), 2.0);
    }
}
