//! # Shorts Compositor
//!
//! Turn landscape footage into vertical shorts: a blurred, stretched copy of
//! the clip fills the letterbox, a green-screen reaction is keyed into a
//! corner, a label fades in and out, and dialogue and music are mixed to the
//! exact length of the video.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shorts_compositor::{
//!     composition::{Job, ShortsPipeline},
//!     config::Config,
//!     video::{FfmpegDecoder, FfmpegEncoder},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let decoder = Arc::new(FfmpegDecoder::new(config.audio.format())?);
//! let encoder = Arc::new(FfmpegEncoder::new()?);
//!
//! let pipeline = ShortsPipeline::new(config, decoder, encoder)?;
//! pipeline.run(&Job {
//!     index: 1,
//!     input: "downloads/clip.mp4".into(),
//!     reaction: Some("reactions/laugh.mp4".into()),
//!     music: "background/track.mp3".into(),
//!     output: "output/output_1_clip_shorts.mp4".into(),
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - frames, lazy frame streams, fit-with-blur, decoder/encoder boundaries
//! - [`segment`] - chroma keying and externally supplied mattes
//! - [`audio`] - audio streams, loading and duration-exact mixing
//! - [`composition`] - layers, the compositor and the batch/compile drivers
//! - [`config`] - configuration management
//!
//! Streams are immutable and evaluated on demand: nothing is decoded,
//! blurred or blended until the encoder pulls a frame.

pub mod audio;
pub mod composition;
pub mod config;
pub mod error;
pub mod segment;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{BatchRunner, Compositor, Layer, ShortsPipeline},
    config::Config,
    error::{CompositorError, Result},
    segment::{ChromaKey, Segmenter},
    video::{fit_with_blur, FrameStream},
};
