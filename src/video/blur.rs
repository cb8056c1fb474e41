//! Separable Gaussian smoothing for frames and mattes.
//!
//! Kernel sizing follows the usual convention where a sigma of zero is
//! derived from the kernel size, so a 55-tap kernel behaves like the
//! letterbox blur most short-form editors ship with.

use rayon::prelude::*;

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, Matte, MatteImage};

/// Normalized 1-D Gaussian weights
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Build a kernel with `size` taps (odd, >= 1)
    ///
    /// A `sigma` of `None` or `<= 0` derives it from the size as
    /// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
    pub fn new(size: usize, sigma: Option<f32>) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(VideoError::InvalidParameters {
                details: format!("blur kernel size must be odd and positive, got {}", size),
            }
            .into());
        }

        let sigma = match sigma {
            Some(s) if s > 0.0 => s,
            _ => 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8,
        };

        let radius = (size / 2) as isize;
        let denom = 2.0 * sigma * sigma;
        let mut weights: Vec<f32> = (-radius..=radius)
            .map(|i| (-((i * i) as f32) / denom).exp())
            .collect();
        let sum: f32 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }

        Ok(Self { weights })
    }

    pub fn size(&self) -> usize {
        self.weights.len()
    }

    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

/// Channel storage the blur can accumulate in `f32`
trait BlurSample: Copy + Send + Sync {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl BlurSample for u8 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, 255.0) as u8
    }
}

impl BlurSample for f32 {
    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

/// Mirror an out-of-range index back inside `0..len` without repeating the edge sample
fn reflect_101(index: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Horizontal pass followed by a vertical pass over interleaved channels
fn separable_blur<S: BlurSample>(
    src: &[S],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &GaussianKernel,
) -> Vec<S> {
    let radius = kernel.radius() as isize;
    let weights = kernel.weights();
    let row_len = width * channels;

    let mut horizontal = vec![0.0f32; src.len()];
    horizontal
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, out_row)| {
            let in_row = &src[y * row_len..(y + 1) * row_len];
            for x in 0..width {
                for c in 0..channels {
                    let mut acc = 0.0f32;
                    for (k, w) in weights.iter().enumerate() {
                        let sx = reflect_101(x as isize + k as isize - radius, width);
                        acc += in_row[sx * channels + c].to_f32() * w;
                    }
                    out_row[x * channels + c] = acc;
                }
            }
        });

    let mut out = vec![S::from_f32(0.0); src.len()];
    out.par_chunks_mut(row_len).enumerate().for_each(|(y, out_row)| {
        for (i, slot) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, w) in weights.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - radius, height);
                acc += horizontal[sy * row_len + i] * w;
            }
            *slot = S::from_f32(acc);
        }
    });

    out
}

/// Blur an RGB frame, returning a new frame of the same size
pub fn blur_frame(frame: &Frame, kernel: &GaussianKernel) -> Frame {
    let (width, height) = (frame.width(), frame.height());
    let data = separable_blur(frame.as_rgb_bytes(), width as usize, height as usize, 3, kernel);
    // Same length as the source buffer, so `from_raw` cannot fail
    Frame::from_rgb_bytes(width, height, data).unwrap_or_else(|| frame.clone())
}

/// Blur a matte, used to feather hard chroma-key edges
pub fn blur_matte(matte: &Matte, kernel: &GaussianKernel) -> Matte {
    let (width, height) = (matte.width(), matte.height());
    let data =
        separable_blur(matte.as_image().as_raw(), width as usize, height as usize, 1, kernel);
    match MatteImage::from_raw(width, height, data) {
        Some(buffer) => Matte::new(buffer),
        None => matte.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let kernel = GaussianKernel::new(55, None).unwrap();
        assert_eq!(kernel.size(), 55);
        assert_eq!(kernel.radius(), 27);

        let sum: f32 = kernel.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);

        let w = kernel.weights();
        for i in 0..w.len() / 2 {
            assert!((w[i] - w[w.len() - 1 - i]).abs() < 1e-7);
        }
        assert!(w[27] > w[26]);
    }

    #[test]
    fn test_even_kernel_rejected() {
        assert!(GaussianKernel::new(54, None).is_err());
        assert!(GaussianKernel::new(0, None).is_err());
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 5), 3);
        assert_eq!(reflect_101(-7, 1), 0);
    }

    #[test]
    fn test_uniform_frame_is_unchanged() {
        let kernel = GaussianKernel::new(9, None).unwrap();
        let frame = Frame::new_filled(12, 7, [40, 120, 200]);
        let blurred = blur_frame(&frame, &kernel);
        assert_eq!(blurred, frame);
    }

    #[test]
    fn test_blur_spreads_a_hard_edge() {
        let kernel = GaussianKernel::new(5, None).unwrap();
        let mut frame = Frame::new_black(10, 1);
        for x in 5..10 {
            frame.set_pixel(x, 0, [255, 255, 255]);
        }

        let blurred = blur_frame(&frame, &kernel);
        let left = blurred.get_pixel(4, 0)[0];
        let right = blurred.get_pixel(5, 0)[0];
        assert!(left > 0 && left < 128, "left of edge was {}", left);
        assert!(right > 128 && right < 255, "right of edge was {}", right);
    }

    #[test]
    fn test_matte_blur_stays_in_range() {
        let kernel = GaussianKernel::new(3, None).unwrap();
        let matte = Matte::from_fn(6, 6, |x, _| image::Luma([if x < 3 { 0.0 } else { 1.0 }]));
        let soft = blur_matte(&matte, &kernel);
        for y in 0..6 {
            for x in 0..6 {
                let v = soft.get(x, y);
                assert!((0.0..=1.0).contains(&v));
            }
        }
        assert!(soft.get(2, 0) > 0.0 && soft.get(3, 0) < 1.0);
    }
}
