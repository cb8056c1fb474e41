use image::{imageops, ImageBuffer, Luma, Rgb, RgbImage, RgbaImage};

/// Single-channel opacity buffer with values in `[0.0, 1.0]`
pub type MatteImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Anything a [`Stream`](crate::video::Stream) can carry: it has a fixed pixel size
pub trait Raster: Clone + Send + Sync + 'static {
    fn dimensions(&self) -> (u32, u32);

    /// Resample to an exact size
    fn resized(&self, width: u32, height: u32) -> Self;

    /// Copy out a sub-rectangle (must lie inside the raster)
    fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Self;
}

/// Represents a single video frame
///
/// This is a simple wrapper around an RGB image buffer that provides
/// convenient methods for pixel access used by the transforms.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Set a pixel at the given coordinates
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Raw interleaved RGB bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }
}

impl Raster for Frame {
    fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    fn resized(&self, width: u32, height: u32) -> Self {
        if self.buffer.dimensions() == (width, height) {
            return self.clone();
        }
        Self::new(imageops::resize(&self.buffer, width, height, imageops::FilterType::Triangle))
    }

    fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(imageops::crop_imm(&self.buffer, x, y, width, height).to_image())
    }
}

/// Per-pixel foreground strength, aligned with a color [`Frame`]
#[derive(Clone, Debug, PartialEq)]
pub struct Matte {
    buffer: MatteImage,
}

impl Matte {
    /// Wrap a buffer, clamping every value into `[0, 1]`
    pub fn new(mut buffer: MatteImage) -> Self {
        for value in buffer.iter_mut() {
            *value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        }
        Self { buffer }
    }

    /// A matte with the same value everywhere
    pub fn new_filled(width: u32, height: u32, value: f32) -> Self {
        Self::new(ImageBuffer::from_pixel(width, height, Luma([value])))
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: FnMut(u32, u32) -> Luma<f32>,
    {
        Self::new(ImageBuffer::from_fn(width, height, f))
    }

    /// Read the alpha channel of an RGBA image
    pub fn from_alpha(image: &RgbaImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| {
            Luma([image.get_pixel(x, y).0[3] as f32 / 255.0])
        })
    }

    /// Interpret a grayscale rendition of a frame as foreground probability
    pub fn from_luma(frame: &Frame) -> Self {
        Self::from_fn(frame.width(), frame.height(), |x, y| {
            let [r, g, b] = frame.get_pixel(x, y);
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            Luma([luma / 255.0])
        })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.buffer.get_pixel(x, y).0[0]
    }

    pub fn as_image(&self) -> &MatteImage {
        &self.buffer
    }

    /// True when no pixel carries any foreground
    pub fn is_fully_transparent(&self) -> bool {
        self.buffer.iter().all(|&v| v == 0.0)
    }
}

impl Raster for Matte {
    fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    fn resized(&self, width: u32, height: u32) -> Self {
        if self.buffer.dimensions() == (width, height) {
            return self.clone();
        }
        Self::new(imageops::resize(&self.buffer, width, height, imageops::FilterType::Triangle))
    }

    fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { buffer: imageops::crop_imm(&self.buffer, x, y, width, height).to_image() }
    }
}
