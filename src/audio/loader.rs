use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::types::AudioStream;
use crate::error::{AudioError, Result};

/// Audio file loader supporting multiple formats
pub struct AudioLoader;

impl AudioLoader {
    /// Load an audio file into an [`AudioStream`] at its native rate and layout
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioStream> {
        let path = path.as_ref();
        let extension = Self::detect_format(path).unwrap_or_default();

        let stream = match extension.as_str() {
            "wav" => Self::load_wav(path)?,
            "mp3" | "flac" | "ogg" | "m4a" | "aac" => Self::load_with_symphonia(path)?,
            _ => {
                return Err(AudioError::UnsupportedFormat { format: extension }.into());
            }
        };

        debug!(
            "Loaded {}: {:.2}s, {} Hz, {} channels",
            path.display(),
            stream.duration(),
            stream.sample_rate(),
            stream.channels()
        );
        Ok(stream)
    }

    /// Load WAV files using the hound crate (most reliable for WAV)
    fn load_wav(path: &Path) -> Result<AudioStream> {
        let load_failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };

        let reader = hound::WavReader::open(path).map_err(|_| load_failed())?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| load_failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| Self::int_to_float(s, bit_depth)))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| load_failed())?
            }
        };

        AudioStream::new(samples, spec.sample_rate, spec.channels)
    }

    /// Load compressed formats using Symphonia
    fn load_with_symphonia(path: &Path) -> Result<AudioStream> {
        let load_failed = || AudioError::LoadFailed {
            path: path.display().to_string(),
        };

        let file = File::open(path).map_err(|_| load_failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| load_failed())?;
        let mut format = probed.format;

        // First track with a decodable codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(load_failed)?;
        let track_id = track.id;

        let sample_rate =
            track.codec_params.sample_rate.ok_or_else(|| AudioError::InvalidParameters {
                details: format!("{} has no sample rate", path.display()),
            })?;
        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| AudioError::InvalidParameters {
                details: format!("{} has no channel information", path.display()),
            })?
            .count() as u16;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|_| load_failed())?;

        let mut samples = Vec::new();
        let mut buffer: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => {
                    warn!("Stopped reading {} early: {}", path.display(), e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let buf = buffer.get_or_insert_with(|| {
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    if buf.capacity() < decoded.capacity() * decoded.spec().channels.count() {
                        *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                    }
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(_) => return Err(load_failed().into()),
            }
        }

        AudioStream::new(samples, sample_rate, channels)
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => (sample as f32 - 128.0) / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Detect audio format from file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Check if a file format is supported
    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}

/// Write a stream as 32-bit float WAV
pub fn write_wav<P: AsRef<Path>>(audio: &AudioStream, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: audio.channels(),
        sample_rate: audio.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let write_failed = |e: hound::Error| AudioError::InvalidParameters {
        details: format!("failed to write {}: {}", path.display(), e),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(write_failed)?;
    for &sample in audio.samples() {
        writer.write_sample(sample).map_err(write_failed)?;
    }
    writer.finalize().map_err(write_failed)?;
    Ok(())
}
