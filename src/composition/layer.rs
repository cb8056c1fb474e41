use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::{CompositionError, Result};
use crate::segment::{check_aligned, Segmented};
use crate::video::{Frame, FrameStream, Matte, MatteStream, TimeWindow};

/// Placement of a layer along one canvas axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    /// Flush with the left/top edge
    Start,
    Center,
    /// Flush with the right/bottom edge
    End,
    /// Explicit pixel offset of the layer's left/top edge; may be negative
    Offset(i64),
}

impl Align {
    fn resolve(self, canvas: u32, layer: u32) -> i64 {
        match self {
            Align::Start => 0,
            Align::Center => (canvas as i64 - layer as i64) / 2,
            Align::End => canvas as i64 - layer as i64,
            Align::Offset(offset) => offset,
        }
    }
}

/// Named canvas anchors used by the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    Center,
    TopCenter,
    BottomCenter,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Where a layer's top-left corner lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: Align,
    pub y: Align,
}

impl Default for Position {
    fn default() -> Self {
        Self::absolute(0, 0)
    }
}

impl Position {
    pub fn new(x: Align, y: Align) -> Self {
        Self { x, y }
    }

    pub fn absolute(x: i64, y: i64) -> Self {
        Self::new(Align::Offset(x), Align::Offset(y))
    }

    pub fn anchored(anchor: Anchor) -> Self {
        use Align::*;
        match anchor {
            Anchor::Center => Self::new(Center, Center),
            Anchor::TopCenter => Self::new(Center, Start),
            Anchor::BottomCenter => Self::new(Center, End),
            Anchor::TopLeft => Self::new(Start, Start),
            Anchor::TopRight => Self::new(End, Start),
            Anchor::BottomLeft => Self::new(Start, End),
            Anchor::BottomRight => Self::new(End, End),
        }
    }

    /// Top-left corner for a `layer`-sized rectangle on a `canvas`-sized frame
    pub fn resolve(&self, canvas: (u32, u32), layer: (u32, u32)) -> (i64, i64) {
        (self.x.resolve(canvas.0, layer.0), self.y.resolve(canvas.1, layer.1))
    }
}

impl From<Anchor> for Position {
    fn from(anchor: Anchor) -> Self {
        Self::anchored(anchor)
    }
}

/// One visual input to the [`Compositor`](crate::composition::Compositor)
///
/// Without a matte the layer is fully opaque inside its rectangle.
#[derive(Debug, Clone)]
pub struct Layer {
    source: FrameStream,
    matte: Option<MatteStream>,
    position: Position,
    window: Option<TimeWindow>,
    fade_in: f64,
    fade_out: f64,
}

impl Layer {
    pub fn new(source: FrameStream) -> Self {
        Self {
            source,
            matte: None,
            position: Position::default(),
            window: None,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }

    /// Layer from a color stream and its matte
    pub fn from_segmented(segmented: Segmented) -> Self {
        let (color, matte) = segmented.into_parts();
        Self {
            matte: Some(matte),
            ..Self::new(color)
        }
    }

    /// Still layer from a pre-rendered RGBA image (overlay text, stickers)
    pub fn from_rgba(image: &RgbaImage, fps: f64, duration: f64) -> Result<Self> {
        let color = Frame::new(image::DynamicImage::ImageRgba8(image.clone()).to_rgb8());
        let source = FrameStream::still(color, fps, duration)?;
        let matte = MatteStream::still(Matte::from_alpha(image), fps, duration)?;
        Self::new(source).with_matte(matte)
    }

    /// Attach a matte; it must match the source frame for frame
    pub fn with_matte(mut self, matte: MatteStream) -> Result<Self> {
        check_aligned(&self.source, &matte)?;
        self.matte = Some(matte);
        Ok(self)
    }

    pub fn at(mut self, position: impl Into<Position>) -> Self {
        self.position = position.into();
        self
    }

    /// Restrict the layer to part of the output timeline
    pub fn during(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Opacity ramps at the start and end of the layer's window, in seconds
    pub fn with_fades(mut self, fade_in: f64, fade_out: f64) -> Result<Self> {
        for (name, value) in [("fade_in", fade_in), ("fade_out", fade_out)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CompositionError::InvalidParameters {
                    details: format!("{} must be finite and non-negative, got {}", name, value),
                }
                .into());
            }
        }
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        Ok(self)
    }

    /// Scale source and matte together to an exact size
    pub fn resized(mut self, width: u32, height: u32) -> Result<Self> {
        self.source = self.source.resized(width, height)?;
        self.matte = match self.matte {
            Some(matte) => Some(matte.resized(width, height)?),
            None => None,
        };
        Ok(self)
    }

    /// Uniformly scale source and matte so the width becomes `width`
    pub fn scaled_to_width(self, width: u32) -> Result<Self> {
        let height = crate::video::stream::scaled_dimension(self.height(), width, self.width());
        self.resized(width, height)
    }

    pub fn source(&self) -> &FrameStream {
        &self.source
    }

    pub fn matte(&self) -> Option<&MatteStream> {
        self.matte.as_ref()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn width(&self) -> u32 {
        self.source.width()
    }

    pub fn height(&self) -> u32 {
        self.source.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.source.info().size()
    }

    /// Fade multiplier at `local` seconds into a window lasting `span` seconds
    pub(crate) fn opacity_at(&self, local: f64, span: f64) -> f32 {
        let mut opacity = 1.0f64;
        if self.fade_in > 0.0 {
            opacity = opacity.min(local / self.fade_in);
        }
        if self.fade_out > 0.0 {
            opacity = opacity.min((span - local) / self.fade_out);
        }
        opacity.clamp(0.0, 1.0) as f32
    }
}
