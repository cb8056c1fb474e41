//! # Foreground Segmentation
//!
//! Splits a frame stream into a color stream and a time-aligned matte
//! stream. Two interchangeable sources are provided:
//!
//! - [`ChromaKey`]: classifies pixels against an HSV key-color window
//! - [`PrecomputedMatte`]: uses an externally produced per-frame
//!   foreground probability, such as the output of a matting model
//!
//! Both implement [`Segmenter`], so the pipeline does not care which one
//! produced the matte.

pub mod chroma;

use std::sync::Arc;

use image::Rgb;

pub use chroma::{rgb_to_hsv8, ChromaKey, ChromaKeyConfig, KeyColorRange};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, Matte};
use crate::video::{FrameSource, FrameStream, MatteStream};

/// A color stream paired with a matte of identical frame count and size
#[derive(Debug, Clone)]
pub struct Segmented {
    color: FrameStream,
    matte: MatteStream,
}

impl Segmented {
    /// Pair two streams, rejecting any misalignment instead of truncating
    pub fn new(color: FrameStream, matte: MatteStream) -> Result<Self> {
        check_aligned(&color, &matte)?;
        Ok(Self { color, matte })
    }

    pub fn color(&self) -> &FrameStream {
        &self.color
    }

    pub fn matte(&self) -> &MatteStream {
        &self.matte
    }

    pub fn into_parts(self) -> (FrameStream, MatteStream) {
        (self.color, self.matte)
    }
}

/// Frame count, size and rate must match one to one
pub fn check_aligned(color: &FrameStream, matte: &MatteStream) -> Result<()> {
    let (c, m) = (color.info(), matte.info());
    if c.frame_count != m.frame_count || c.size() != m.size() || (c.fps - m.fps).abs() > 1e-9 {
        return Err(VideoError::DimensionMismatch {
            details: format!(
                "matte has {} frames of {}x{} @ {:.3} fps, \
                 color has {} frames of {}x{} @ {:.3} fps",
                m.frame_count, m.width, m.height, m.fps, c.frame_count, c.width, c.height, c.fps
            ),
        }
        .into());
    }
    Ok(())
}

/// Turns a color stream into a color + matte pair
pub trait Segmenter: Send + Sync {
    fn segment(&self, stream: &FrameStream) -> Result<Segmented>;
}

/// Foreground probabilities supplied from outside, one matte frame per color frame
#[derive(Debug, Clone)]
pub struct PrecomputedMatte {
    matte: MatteStream,
}

impl PrecomputedMatte {
    pub fn new(matte: MatteStream) -> Self {
        Self { matte }
    }

    /// Read a grayscale rendition (e.g. a decoded matte video) as probabilities
    pub fn from_luma_stream(stream: &FrameStream) -> Result<Self> {
        let (width, height) = stream.info().size();
        let matte = stream.map(width, height, |frame: &Frame| Ok(Matte::from_luma(frame)))?;
        Ok(Self { matte })
    }
}

impl Segmenter for PrecomputedMatte {
    fn segment(&self, stream: &FrameStream) -> Result<Segmented> {
        Segmented::new(stream.clone(), self.matte.clone())
    }
}

/// Paint the subject over a flat key color, producing green-screen footage
///
/// `out = frame * matte + key * (1 - matte)`, rounded per channel.
pub fn bake_key_background(segmented: &Segmented, key: [u8; 3]) -> Result<FrameStream> {
    let info = *segmented.color().info();
    let source = BakeSource {
        color: segmented.color().clone(),
        matte: segmented.matte().clone(),
        key,
    };
    Ok(FrameStream::new(info, Arc::new(source)))
}

struct BakeSource {
    color: FrameStream,
    matte: MatteStream,
    key: [u8; 3],
}

impl FrameSource<Frame> for BakeSource {
    fn frame(&self, index: usize) -> Result<Frame> {
        let mut frame = self.color.frame(index)?;
        let matte = self.matte.frame(index)?;
        for (x, y, pixel) in frame.as_image_mut().enumerate_pixels_mut() {
            let a = matte.get(x, y);
            let Rgb(src) = *pixel;
            let mut out = [0u8; 3];
            for c in 0..3 {
                out[c] = (src[c] as f32 * a + self.key[c] as f32 * (1.0 - a)).round() as u8;
            }
            *pixel = Rgb(out);
        }
        Ok(frame)
    }
}
