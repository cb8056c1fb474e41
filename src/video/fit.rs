//! Letterboxing into a fixed canvas with a blurred copy of the source as filler.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoError};
use crate::video::blur::{blur_frame, GaussianKernel};
use crate::video::stream::{scaled_dimension, FrameStream};
use crate::video::types::{Frame, Raster};

/// Settings for [`fit_with_blur`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FitConfig {
    /// Gaussian kernel size in pixels (odd)
    pub kernel_size: usize,

    /// Gaussian sigma; derived from the kernel size when absent
    pub sigma: Option<f32>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            kernel_size: 55,
            sigma: None,
        }
    }
}

/// Size of the aspect-preserving foreground inside a `target_w`x`target_h` canvas
///
/// Relatively wider sources are fit to the canvas width, everything else to
/// the canvas height.
pub fn fitted_size(width: u32, height: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let wider = width as u64 * target_h as u64 > target_w as u64 * height as u64;
    if wider {
        let h = scaled_dimension(height, target_w, width).min(target_h);
        (target_w, h)
    } else {
        let w = scaled_dimension(width, target_h, height).min(target_w);
        (w, target_h)
    }
}

/// Fit one frame: stretched + blurred background, centered aspect-correct foreground
pub fn fit_frame_with_blur(
    frame: &Frame,
    target_w: u32,
    target_h: u32,
    kernel: &GaussianKernel,
) -> Frame {
    let (fg_w, fg_h) = fitted_size(frame.width(), frame.height(), target_w, target_h);

    let mut canvas = blur_frame(&frame.resized(target_w, target_h), kernel);
    let foreground = frame.resized(fg_w, fg_h);

    let off_x = (target_w - fg_w) / 2;
    let off_y = (target_h - fg_h) / 2;
    for y in 0..fg_h {
        for x in 0..fg_w {
            canvas.set_pixel(off_x + x, off_y + y, foreground.get_pixel(x, y));
        }
    }

    canvas
}

/// Fit a whole stream into `target_w`x`target_h`, keeping its rate and duration
///
/// Audio is not part of a [`FrameStream`]; the blurred background carries none.
pub fn fit_with_blur(
    stream: &FrameStream,
    target_w: u32,
    target_h: u32,
    config: &FitConfig,
) -> Result<FrameStream> {
    if target_w == 0 || target_h == 0 {
        return Err(VideoError::InvalidParameters {
            details: format!("fit target must be non-zero, got {}x{}", target_w, target_h),
        }
        .into());
    }

    let kernel = Arc::new(GaussianKernel::new(config.kernel_size, config.sigma)?);
    stream.map(target_w, target_h, move |frame: &Frame| {
        Ok(fit_frame_with_blur(frame, target_w, target_h, &kernel))
    })
}
