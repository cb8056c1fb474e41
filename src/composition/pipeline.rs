use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioMixer, AudioStream, AudioTrack},
    composition::{Align, Compositor, Layer, Position},
    config::{Config, Layout},
    error::{Result, VideoError},
    segment::{ChromaKey, Segmenter},
    video::{fit_with_blur, EncodedVideo, FrameStream, MediaDecoder, MediaEncoder},
};

/// Everything needed to produce one short
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// 1-based position in the batch
    pub index: usize,
    pub input: PathBuf,
    pub reaction: Option<PathBuf>,
    pub music: PathBuf,
    pub output: PathBuf,
}

/// Output file name for the `index`-th input
pub fn output_name(index: usize, input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_string());
    format!("output_{}_{}_shorts.mp4", index, stem)
}

/// A short ready to encode
#[derive(Debug, Clone)]
pub struct ComposedShort {
    pub video: FrameStream,
    pub audio: AudioStream,
}

/// Builds and encodes one short per [`Job`]
///
/// The pipeline follows a fixed order:
/// 1. Decode - open the main clip (and reaction, music)
/// 2. Layers - fit, key and place every visual input for the layout
/// 3. Composite - paint layers back to front for the main clip's duration
/// 4. Mix - fit dialogue and music to the same duration
/// 5. Encode - hand the finished pair to the encoder
pub struct ShortsPipeline {
    config: Config,
    decoder: Arc<dyn MediaDecoder>,
    encoder: Arc<dyn MediaEncoder>,
    overlay: Option<RgbaImage>,
}

impl ShortsPipeline {
    /// Validates the configuration and loads the overlay image if one is configured
    pub fn new(
        config: Config,
        decoder: Arc<dyn MediaDecoder>,
        encoder: Arc<dyn MediaEncoder>,
    ) -> Result<Self> {
        config.validate()?;

        let overlay = match &config.overlay.image {
            Some(path) => Some(load_overlay(path)?),
            None => None,
        };

        Ok(Self {
            config,
            decoder,
            encoder,
            overlay,
        })
    }

    /// Replace the overlay with an already rasterized image
    pub fn with_overlay(mut self, overlay: RgbaImage) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn decoder(&self) -> &Arc<dyn MediaDecoder> {
        &self.decoder
    }

    pub fn encoder(&self) -> &Arc<dyn MediaEncoder> {
        &self.encoder
    }

    /// Compose and encode one job
    pub fn run(&self, job: &Job) -> Result<EncodedVideo> {
        info!("🎬 [{}] Processing {}", job.index, job.input.display());
        let short = self.compose(job)?;

        // ==========================================
        // STEP 5: ENCODE
        // ==========================================
        let encoded = self
            .encoder
            .encode(&short.video, Some(&short.audio), &job.output, &self.config.encode)?;

        info!(
            "✅ [{}] Saved {} ({:.1}s, {} frames)",
            job.index,
            encoded.path.display(),
            encoded.duration,
            encoded.frame_count
        );
        Ok(encoded)
    }

    /// Build the composed streams for one job without encoding them
    pub fn compose(&self, job: &Job) -> Result<ComposedShort> {
        let layout = self.config.batch.layout;

        // ==========================================
        // STEP 1: DECODE
        // ==========================================
        let main = self.decoder.open(&job.input)?;
        let duration = main.video.duration();
        debug!(
            "Main clip: {}x{} @ {:.2} fps, {:.2}s",
            main.video.width(),
            main.video.height(),
            main.video.fps(),
            duration
        );

        let music = self.decoder.open_audio(&job.music)?;

        // ==========================================
        // STEP 2: LAYERS
        // ==========================================
        let (canvas, mut layers) = match layout {
            Layout::Cutout => {
                let reaction = self.open_reaction(job, duration)?;
                self.cutout_layers(&main.video, reaction)?
            }
            Layout::Split => {
                let reaction = self.open_reaction(job, duration)?;
                self.split_layers(&main.video, reaction)?
            }
            Layout::Plain => self.plain_layers(&main.video)?,
        };

        if let Some(overlay) = &self.overlay {
            let position = match layout {
                Layout::Plain => Position::new(Align::Center, Align::End),
                Layout::Cutout | Layout::Split => Position::new(
                    Align::Center,
                    Align::Offset(canvas.1 as i64 - self.config.overlay.bottom_offset as i64),
                ),
            };
            let layer = Layer::from_rgba(overlay, main.video.fps(), duration)?
                .at(position)
                .with_fades(self.config.overlay.fade_in, self.config.overlay.fade_out)?;
            layers.push(layer);
        }

        // ==========================================
        // STEP 3: COMPOSITE
        // ==========================================
        let mut compositor =
            Compositor::new(canvas.0, canvas.1)?.with_background(self.config.canvas.background);
        if let Some(fps) = self.config.canvas.fps {
            compositor = compositor.with_fps(fps)?;
        }
        let video = compositor.compose(duration, layers)?;

        // ==========================================
        // STEP 4: MIX
        // ==========================================
        let mut tracks = Vec::with_capacity(2);
        if layout == Layout::Cutout {
            match main.audio {
                Some(dialogue) => {
                    tracks.push(AudioTrack::new(dialogue, self.config.audio.dialogue_volume)?)
                }
                None => debug!("{} has no audio track", job.input.display()),
            }
        }
        tracks.push(AudioTrack::new(music, self.config.audio.music_volume_for(layout))?);

        let mixer = AudioMixer::new(self.config.audio.format())?;
        let audio = mixer.mix(&tracks, video.duration())?;

        info!(
            "🎞️  [{}] Composed {} layout: {}x{}, {} frames, {:.2}s",
            job.index,
            layout,
            canvas.0,
            canvas.1,
            video.frame_count(),
            video.duration()
        );
        Ok(ComposedShort { video, audio })
    }

    /// Reaction clip looped (or cut) to the main clip's duration
    fn open_reaction(&self, job: &Job, duration: f64) -> Result<FrameStream> {
        let path = job.reaction.as_ref().ok_or_else(|| VideoError::InvalidParameters {
            details: format!("{} layout needs a reaction clip", self.config.batch.layout),
        })?;
        let reaction = self.decoder.open(path)?;
        debug!("Reaction {}: {:.2}s", path.display(), reaction.video.duration());
        reaction.video.looped(duration)
    }

    fn canvas(&self) -> (u32, u32) {
        (self.config.canvas.width, self.config.canvas.height)
    }

    /// Full-canvas blurred main clip with a keyed reaction cutout on top
    fn cutout_layers(
        &self,
        main: &FrameStream,
        reaction: FrameStream,
    ) -> Result<((u32, u32), Vec<Layer>)> {
        let (width, height) = self.canvas();
        let background = Layer::new(fit_with_blur(main, width, height, &self.config.fit)?);

        let keyer = ChromaKey::new(self.config.chroma.clone())?;
        let small = reaction.scaled_to_width(self.config.reaction.width)?;
        let cutout = Layer::from_segmented(keyer.segment(&small)?).at(self.config.reaction.anchor);

        Ok(((width, height), vec![background, cutout]))
    }

    /// Main clip on the top half, reaction on the bottom half, both letterboxed
    fn split_layers(
        &self,
        main: &FrameStream,
        reaction: FrameStream,
    ) -> Result<((u32, u32), Vec<Layer>)> {
        let (width, height) = self.canvas();
        let top_height = height / 2;
        let bottom_height = height - top_height;

        let top = Layer::new(fit_with_blur(main, width, top_height, &self.config.fit)?)
            .at(Position::new(Align::Center, Align::Start));
        let bottom = Layer::new(fit_with_blur(&reaction, width, bottom_height, &self.config.fit)?)
            .at(Position::new(Align::Center, Align::End));

        Ok(((width, height), vec![top, bottom]))
    }

    /// Main clip minus its bottom strip; the canvas follows the cropped clip
    fn plain_layers(&self, main: &FrameStream) -> Result<((u32, u32), Vec<Layer>)> {
        let crop = self.config.batch.crop_bottom;
        if main.height() <= crop + 1 {
            return Err(VideoError::InvalidParameters {
                details: format!("clip is {} px tall, cannot crop {} px", main.height(), crop),
            }
            .into());
        }
        // yuv420p wants even sides
        let width = main.width() & !1;
        let height = (main.height() - crop) & !1;
        if width == 0 {
            return Err(VideoError::InvalidParameters {
                details: format!("clip is {} px wide", main.width()),
            }
            .into());
        }

        let cropped = main.cropped(0, 0, width, height)?;
        Ok(((width, height), vec![Layer::new(cropped)]))
    }
}

/// Load a pre-rendered RGBA overlay
pub fn load_overlay(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).map_err(|e| {
        warn!("Could not open overlay {}: {}", path.display(), e);
        VideoError::DecodeFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(image.to_rgba8())
}
