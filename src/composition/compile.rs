//! Joins finished shorts into one long video under a single music track.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::{
    audio::{AudioMixer, AudioTrack},
    composition::batch::require_pool,
    config::Config,
    error::{CompositionError, Result},
    video::{fit_with_blur, EncodedVideo, FrameStream, MediaDecoder, MediaEncoder},
};

/// Inputs of one compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompilePlan {
    /// Clips in playback order
    pub clips: Vec<PathBuf>,
    pub music: PathBuf,
    pub output: PathBuf,
}

/// Concatenates clips, replaces their sound with looped or trimmed music
pub struct Compiler<'a> {
    config: &'a Config,
    decoder: &'a dyn MediaDecoder,
    encoder: &'a dyn MediaEncoder,
}

impl<'a> Compiler<'a> {
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

    /// Every video in `clips_dir` (by name) plus one random track from `music_dir`
    pub fn plan<R: Rng + ?Sized>(
        &self,
        clips_dir: &Path,
        music_dir: &Path,
        output: &Path,
        rng: &mut R,
    ) -> Result<CompilePlan> {
        let mut clips = require_pool(clips_dir, &self.config.batch.video_extensions, "short")?;
        // Don't feed a previous compilation back into itself
        clips.retain(|clip| clip.as_path() != output);
        if clips.is_empty() {
            return Err(CompositionError::EmptyPool {
                kind: "short".to_string(),
                path: clips_dir.display().to_string(),
            }
            .into());
        }

        let pool = require_pool(music_dir, &self.config.batch.music_extensions, "music")?;
        let music = pool.choose(rng).cloned().ok_or_else(|| CompositionError::EmptyPool {
            kind: "music".to_string(),
            path: music_dir.display().to_string(),
        })?;

        Ok(CompilePlan {
            clips,
            music,
            output: output.to_path_buf(),
        })
    }

    /// Joined clips, all brought to the first clip's size and frame rate
    pub fn join(&self, clips: &[PathBuf]) -> Result<FrameStream> {
        let mut joined: Option<FrameStream> = None;
        for clip in clips {
            let stream = self.decoder.open(clip)?.video;
            joined = Some(match joined {
                None => stream,
                Some(head) => {
                    let mut tail = stream.retimed(head.fps())?;
                    if tail.info().size() != head.info().size() {
                        let (width, height) = (head.width(), head.height());
                        debug!("Letterboxing {} to {}x{}", clip.display(), width, height);
                        tail = fit_with_blur(&tail, width, height, &self.config.fit)?;
                    }
                    head.concat(&tail)?
                }
            });
        }

        joined.ok_or_else(|| {
            CompositionError::InvalidParameters {
                details: "nothing to compile".to_string(),
            }
            .into()
        })
    }

    pub fn run(&self, plan: &CompilePlan) -> Result<EncodedVideo> {
        info!("📼 Compiling {} clips into {}", plan.clips.len(), plan.output.display());
        let video = self.join(&plan.clips)?;

        let music = self.decoder.open_audio(&plan.music)?;
        let mixer = AudioMixer::new(self.config.audio.format())?;
        let audio = mixer.mix(
            &[AudioTrack::new(music, self.config.audio.compile_music_volume)?],
            video.duration(),
        )?;
        info!("   Music: {} ({:.1}s total)", plan.music.display(), video.duration());

        self.encoder
            .encode(&video, Some(&audio), &plan.output, &self.config.encode)
    }
}
