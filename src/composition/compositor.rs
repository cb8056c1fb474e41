//! Back-to-front "over" compositing of layers into one frame stream.

use std::sync::Arc;

use tracing::debug;

use crate::composition::layer::Layer;
use crate::error::{CompositionError, Result};
use crate::video::{
    frames_for_duration, Frame, FrameSource, FrameStream, Matte, StreamInfo, TimeWindow,
};

/// Fixed canvas that layers are painted onto
#[derive(Debug, Clone)]
pub struct Compositor {
    width: u32,
    height: u32,
    background: [u8; 3],
    fps: Option<f64>,
}

impl Compositor {
    /// A black canvas of `width`x`height`
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CompositionError::InvalidParameters {
                details: format!("canvas must be non-empty, got {}x{}", width, height),
            }
            .into());
        }
        Ok(Self {
            width,
            height,
            background: [0, 0, 0],
            fps: None,
        })
    }

    /// Fill color for pixels no layer covers
    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }

    /// Fix the output rate instead of following the fastest layer
    pub fn with_fps(mut self, fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CompositionError::InvalidParameters {
                details: format!("output fps must be finite and positive, got {}", fps),
            }
            .into());
        }
        self.fps = Some(fps);
        Ok(self)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Lay `layers` out for `duration` seconds, first layer at the back
    ///
    /// The returned stream renders lazily and identically on every pull.
    pub fn compose(&self, duration: f64, layers: Vec<Layer>) -> Result<FrameStream> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(CompositionError::InvalidParameters {
                details: format!("duration must be finite and positive, got {}", duration),
            }
            .into());
        }

        let fps = match self.fps {
            Some(fps) => fps,
            None => layers
                .iter()
                .map(|layer| layer.source().fps())
                .fold(None, |max: Option<f64>, fps| Some(max.map_or(fps, |m| m.max(fps))))
                .ok_or_else(|| CompositionError::InvalidParameters {
                    details: "no layers to take a frame rate from; set one explicitly".to_string(),
                })?,
        };

        let mut placed = Vec::with_capacity(layers.len());
        for (index, layer) in layers.into_iter().enumerate() {
            placed.push(self.place(index, layer, duration)?);
        }

        let frame_count = frames_for_duration(duration, fps).max(1);
        let info = StreamInfo::new(self.width, self.height, fps, frame_count)?;
        debug!(
            "Composing {} layers into {} frames of {}x{} @ {:.2} fps",
            placed.len(),
            frame_count,
            self.width,
            self.height,
            fps
        );

        let source = CompositeSource {
            width: self.width,
            height: self.height,
            background: self.background,
            fps,
            layers: placed.into(),
        };
        Ok(FrameStream::new(info, Arc::new(source)))
    }

    fn place(&self, index: usize, layer: Layer, duration: f64) -> Result<PlacedLayer> {
        let window = match layer.window() {
            Some(window) => window,
            // Shorter layers stop contributing once they run out
            None => TimeWindow::full(layer.source().duration().min(duration))?,
        };
        if !window.fits_within(duration) {
            return Err(CompositionError::InvalidLayer {
                index,
                reason: format!(
                    "window [{}, {}) extends past the {}s composition",
                    window.start, window.end, duration
                ),
            }
            .into());
        }

        let (x, y) = layer.position().resolve((self.width, self.height), layer.size());
        Ok(PlacedLayer { layer, window, x, y })
    }
}

struct PlacedLayer {
    layer: Layer,
    window: TimeWindow,
    x: i64,
    y: i64,
}

struct CompositeSource {
    width: u32,
    height: u32,
    background: [u8; 3],
    fps: f64,
    layers: Arc<[PlacedLayer]>,
}

impl FrameSource<Frame> for CompositeSource {
    fn frame(&self, index: usize) -> Result<Frame> {
        let t = index as f64 / self.fps;
        let mut canvas = Frame::new_filled(self.width, self.height, self.background);

        for placed in self.layers.iter() {
            if !placed.window.contains(t) {
                continue;
            }
            let local = t - placed.window.start;
            let opacity = placed.layer.opacity_at(local, placed.window.duration());
            if opacity <= 0.0 {
                continue;
            }

            let color = placed.layer.source().sample(local)?;
            let matte = match placed.layer.matte() {
                Some(matte) => Some(matte.sample(local)?),
                None => None,
            };
            blend_over(&mut canvas, &color, matte.as_ref(), opacity, placed.x, placed.y);
        }

        Ok(canvas)
    }
}

/// `canvas = layer * alpha + canvas * (1 - alpha)` inside the placed rectangle
///
/// `alpha` is the matte value times `opacity`, or `opacity` alone without a
/// matte. Fully opaque pixels are copied exactly.
pub fn blend_over(
    canvas: &mut Frame,
    layer: &Frame,
    matte: Option<&Matte>,
    opacity: f32,
    x: i64,
    y: i64,
) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + layer.width() as i64).min(canvas.width() as i64);
    let y1 = (y + layer.height() as i64).min(canvas.height() as i64);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for cy in y0..y1 {
        let ly = (cy - y) as u32;
        for cx in x0..x1 {
            let lx = (cx - x) as u32;
            let alpha = match matte {
                Some(matte) => matte.get(lx, ly) * opacity,
                None => opacity,
            };
            if alpha <= 0.0 {
                continue;
            }

            let src = layer.get_pixel(lx, ly);
            if alpha >= 1.0 {
                canvas.set_pixel(cx as u32, cy as u32, src);
                continue;
            }

            let dst = canvas.get_pixel(cx as u32, cy as u32);
            let mut out = [0u8; 3];
            for c in 0..3 {
                out[c] = (src[c] as f32 * alpha + dst[c] as f32 * (1.0 - alpha)).round() as u8;
            }
            canvas.set_pixel(cx as u32, cy as u32, out);
        }
    }
}
