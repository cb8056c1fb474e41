use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, VideoError};
use crate::segment::{Segmented, Segmenter};
use crate::video::blur::{blur_matte, GaussianKernel};
use crate::video::types::{Frame, Matte};
use crate::video::FrameStream;

/// Inclusive HSV window on the 8-bit scale (hue 0-180, saturation/value 0-255)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeyColorRange {
    pub hue: (u8, u8),
    pub saturation: (u8, u8),
    pub value: (u8, u8),
}

impl Default for KeyColorRange {
    /// Pure-ish green screen: hue 70-170 degrees, at least ~24% saturation and brightness
    fn default() -> Self {
        Self {
            hue: (35, 85),
            saturation: (60, 255),
            value: (60, 255),
        }
    }
}

impl KeyColorRange {
    pub fn validate(&self) -> Result<()> {
        let ordered = self.hue.0 <= self.hue.1
            && self.saturation.0 <= self.saturation.1
            && self.value.0 <= self.value.1;
        if !ordered || self.hue.1 > 180 {
            return Err(VideoError::InvalidParameters {
                details: format!("invalid key color range {:?}", self),
            }
            .into());
        }
        Ok(())
    }

    /// True when the pixel belongs to the key (background) color
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        let (h, s, v) = rgb_to_hsv8(rgb);
        (self.hue.0..=self.hue.1).contains(&h)
            && (self.saturation.0..=self.saturation.1).contains(&s)
            && (self.value.0..=self.value.1).contains(&v)
    }
}

/// RGB to HSV with hue halved into 0-180 so it fits a byte
pub fn rgb_to_hsv8([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = ((h / 2.0).round() as u32 % 180) as u8;
    (h, s.round().clamp(0.0, 255.0) as u8, v as u8)
}

/// Chroma-key settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChromaKeyConfig {
    /// Gaussian kernel size used to soften the matte edge; 0 keeps it binary
    pub feather: usize,

    /// Black out key pixels in the color output as well as in the matte
    pub zero_keyed_pixels: bool,

    /// Flat background painted behind a subject by the `bake` command
    pub bake_color: [u8; 3],

    /// Color window classified as background
    pub range: KeyColorRange,
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        Self {
            feather: 0,
            zero_keyed_pixels: true,
            bake_color: [0, 255, 0],
            range: KeyColorRange::default(),
        }
    }
}

/// HSV range classifier
#[derive(Debug, Clone)]
pub struct ChromaKey {
    config: ChromaKeyConfig,
    feather: Option<Arc<GaussianKernel>>,
}

impl ChromaKey {
    pub fn new(config: ChromaKeyConfig) -> Result<Self> {
        config.range.validate()?;
        let feather = match config.feather {
            0 => None,
            size => Some(Arc::new(GaussianKernel::new(size, None)?)),
        };
        Ok(Self { config, feather })
    }

    pub fn config(&self) -> &ChromaKeyConfig {
        &self.config
    }

    /// Binary foreground mask: 1 keeps the pixel, 0 marks key color
    pub fn binary_matte(&self, frame: &Frame) -> Matte {
        let range = self.config.range;
        Matte::from_fn(frame.width(), frame.height(), |x, y| {
            let keyed = range.contains(frame.get_pixel(x, y));
            image::Luma([if keyed { 0.0 } else { 1.0 }])
        })
    }

    /// Matte as used for compositing, feathered when configured
    pub fn matte(&self, frame: &Frame) -> Matte {
        let matte = self.binary_matte(frame);
        match &self.feather {
            Some(kernel) => blur_matte(&matte, kernel),
            None => matte,
        }
    }

    /// Color output for one frame
    pub fn clean(&self, frame: &Frame) -> Frame {
        if !self.config.zero_keyed_pixels {
            return frame.clone();
        }
        let mut out = frame.clone();
        for pixel in out.as_image_mut().pixels_mut() {
            if self.config.range.contains(pixel.0) {
                pixel.0 = [0, 0, 0];
            }
        }
        out
    }
}

impl Segmenter for ChromaKey {
    fn segment(&self, stream: &FrameStream) -> Result<Segmented> {
        let (width, height) = stream.info().size();

        let cleaner = self.clone();
        let color = stream.map_frames(move |frame: &Frame| Ok(cleaner.clean(frame)));

        let keyer = self.clone();
        let matte = stream.map(width, height, move |frame: &Frame| Ok(keyer.matte(frame)))?;

        Segmented::new(color, matte)
    }
}
