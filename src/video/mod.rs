//! # Video Processing Module
//!
//! Frame data, lazily evaluated frame streams, the fit-with-blur transform
//! and the decoder/encoder boundaries.

pub mod blur;
pub mod decoder;
pub mod encoder;
pub mod fit;
pub mod stream;
pub mod types;

pub use blur::GaussianKernel;
pub use decoder::{FfmpegDecoder, MediaDecoder, OpenedMedia};
pub use encoder::{EncodeOptions, EncodedVideo, FfmpegEncoder, MediaEncoder};
pub use fit::{fit_with_blur, fitted_size, FitConfig};
pub use stream::{
    frames_for_duration, FrameSource, FrameStream, MatteStream, Stream, StreamInfo, TimeWindow,
};
pub use types::{Frame, Matte, Raster};

use std::path::Path;
use std::process::{Command, Stdio};

/// True when `tool -version` runs successfully
pub fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Lower-cased file extension, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Still image formats opened through `image` rather than ffmpeg
pub fn is_image_file(path: &Path) -> bool {
    matches!(extension_of(path).as_deref(), Some("jpg" | "jpeg" | "png"))
}
