//! Turns a clip plus an externally rendered matte video into green-screen
//! footage the chroma keyer can use as a reaction clip.

use std::path::Path;

use tracing::{debug, info};

use crate::{
    config::Config,
    error::Result,
    segment::{bake_key_background, PrecomputedMatte, Segmenter},
    video::{EncodedVideo, FrameStream, MediaDecoder, MediaEncoder},
};

/// Paints a subject over the configured key color using a supplied matte
pub struct Baker<'a> {
    config: &'a Config,
    decoder: &'a dyn MediaDecoder,
    encoder: &'a dyn MediaEncoder,
}

impl<'a> Baker<'a> {
    pub fn new(
        config: &'a Config,
        decoder: &'a dyn MediaDecoder,
        encoder: &'a dyn MediaEncoder,
    ) -> Self {
        Self {
            config,
            decoder,
            encoder,
        }
    }

    /// Keyed stream for `input`, with `matte` read as per-pixel foreground luma
    ///
    /// The matte video is scaled and retimed to the input when they differ;
    /// a frame count that still disagrees is a dimension mismatch.
    pub fn bake(&self, input: &Path, matte: &Path) -> Result<FrameStream> {
        let color = self.decoder.open(input)?.video;
        let mut luma = self.decoder.open(matte)?.video;

        if luma.info().size() != color.info().size() {
            debug!(
                "Scaling matte {} to {}x{}",
                matte.display(),
                color.width(),
                color.height()
            );
            luma = luma.resized(color.width(), color.height())?;
        }
        if (luma.fps() - color.fps()).abs() > 1e-9 {
            debug!("Retiming matte {} to {:.3} fps", matte.display(), color.fps());
            luma = luma.retimed(color.fps())?;
        }

        let segmented = PrecomputedMatte::from_luma_stream(&luma)?.segment(&color)?;
        bake_key_background(&segmented, self.config.chroma.bake_color)
    }

    /// Bake and encode; the output carries no audio
    pub fn run(&self, input: &Path, matte: &Path, output: &Path) -> Result<EncodedVideo> {
        info!(
            "🟩 Baking {} with matte {} into {}",
            input.display(),
            matte.display(),
            output.display()
        );
        let video = self.bake(input, matte)?;
        self.encoder.encode(&video, None, output, &self.config.encode)
    }
}
