use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    audio::AudioFormat,
    composition::Anchor,
    error::{ConfigError, Result},
    segment::ChromaKeyConfig,
    video::{EncodeOptions, FitConfig, GaussianKernel},
};

/// Main configuration for the shorts compositor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Output canvas
    pub canvas: CanvasConfig,

    /// Blurred letterbox settings
    pub fit: FitConfig,

    /// Green-screen keying of reaction clips
    pub chroma: ChromaKeyConfig,

    /// Reaction cutout size and placement
    pub reaction: ReactionConfig,

    /// Pre-rendered label drawn over every short
    pub overlay: OverlayConfig,

    /// Mix format and track volumes
    pub audio: AudioConfig,

    /// Container and codec settings
    pub encode: EncodeOptions,

    /// Input discovery and scheduling
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.canvas.validate()?;

        GaussianKernel::new(self.fit.kernel_size, self.fit.sigma).map_err(|_| invalid(
            "fit.kernel_size",
            format!("{} (sigma {:?})", self.fit.kernel_size, self.fit.sigma),
        ))?;

        self.chroma
            .range
            .validate()
            .map_err(|_| invalid("chroma.range", format!("{:?}", self.chroma.range)))?;
        if self.chroma.feather != 0 && self.chroma.feather % 2 == 0 {
            return Err(invalid("chroma.feather", self.chroma.feather));
        }

        if self.reaction.width == 0 || self.reaction.width > self.canvas.width {
            return Err(invalid("reaction.width", self.reaction.width));
        }

        self.overlay.validate()?;
        self.audio.validate()?;

        if self.encode.crf > 51 {
            return Err(invalid("encode.crf", self.encode.crf));
        }
        if let Some(fps) = self.encode.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(invalid("encode.fps", fps));
            }
        }

        self.batch.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl fmt::Display) -> crate::error::CompositorError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Output canvas configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,

    /// Fill color where no layer paints
    pub background: [u8; 3],

    /// Fixed output rate; the fastest layer's rate when absent
    pub fps: Option<f64>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            background: [0, 0, 0],
            fps: None,
        }
    }
}

impl CanvasConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid("canvas.size", format!("{}x{}", self.width, self.height)));
        }
        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(invalid("canvas.fps", fps));
            }
        }
        Ok(())
    }
}

/// Reaction cutout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReactionConfig {
    /// Width the keyed reaction is scaled to (height follows its aspect)
    pub width: u32,

    pub anchor: Anchor,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            width: 400,
            anchor: Anchor::BottomLeft,
        }
    }
}

/// Overlay label configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    /// RGBA image (e.g. a rendered "SUBSCRIBE & Like" banner); no overlay when absent
    pub image: Option<PathBuf>,

    /// Distance from the bottom of the canvas to the overlay's top edge
    pub bottom_offset: u32,

    /// Fade-in duration in seconds
    pub fade_in: f64,

    /// Fade-out duration in seconds
    pub fade_out: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            image: None,
            bottom_offset: 150,
            fade_in: 1.0,
            fade_out: 1.0,
        }
    }
}

impl OverlayConfig {
    fn validate(&self) -> Result<()> {
        let fades = [("overlay.fade_in", self.fade_in), ("overlay.fade_out", self.fade_out)];
        for (key, value) in fades {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, value));
            }
        }
        Ok(())
    }
}

/// Audio mix configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Mix sample rate (Hz)
    pub sample_rate: u32,

    /// Mix channel count
    pub channels: u16,

    /// Gain on the main clip's own audio
    pub dialogue_volume: f32,

    /// Gain on the background music; the layout's default when absent
    pub music_volume: Option<f32>,

    /// Gain on the music laid under a compilation
    pub compile_music_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            dialogue_volume: 0.8,
            music_volume: None,
            compile_music_volume: 0.5,
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Music gain for `layout`
    pub fn music_volume_for(&self, layout: Layout) -> f32 {
        self.music_volume.unwrap_or_else(|| layout.default_music_volume())
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", self.sample_rate));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(invalid("audio.channels", self.channels));
        }

        let volumes = [
            ("audio.dialogue_volume", Some(self.dialogue_volume)),
            ("audio.music_volume", self.music_volume),
            ("audio.compile_music_volume", Some(self.compile_music_volume)),
        ];
        for (key, volume) in volumes {
            if let Some(volume) = volume {
                if !volume.is_finite() || volume < 0.0 {
                    return Err(invalid(key, volume));
                }
            }
        }
        Ok(())
    }
}

/// How a single short is assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Blurred-letterbox main clip, keyed reaction cutout in a corner
    #[default]
    Cutout,

    /// Main clip on the top half, reaction on the bottom half
    Split,

    /// Main clip with its bottom strip cropped off, no reaction
    Plain,
}

impl Layout {
    pub fn needs_reaction(&self) -> bool {
        !matches!(self, Layout::Plain)
    }

    pub fn default_music_volume(&self) -> f32 {
        match self {
            Layout::Cutout => 0.4,
            Layout::Split | Layout::Plain => 0.5,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layout::Cutout => "cutout",
            Layout::Split => "split",
            Layout::Plain => "plain",
        };
        f.write_str(name)
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cutout" => Ok(Layout::Cutout),
            "split" => Ok(Layout::Split),
            "plain" => Ok(Layout::Plain),
            other => Err(format!("unknown layout '{}' (expected cutout, split or plain)", other)),
        }
    }
}

/// Batch discovery and scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub layout: Layout,

    /// Pixels cut from the bottom of the main clip by the plain layout
    pub crop_bottom: u32,

    /// Extensions (without dot, case-insensitive) accepted as input or reaction video
    pub video_extensions: Vec<String>,

    /// Extensions accepted as background music
    pub music_extensions: Vec<String>,

    /// Items processed concurrently
    pub workers: usize,

    /// Seed for reaction/music selection; entropy when absent
    pub seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            crop_bottom: 50,
            video_extensions: ["mp4", "mov", "mkv", "avi", "webm"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            music_extensions: ["mp3", "wav", "aac", "m4a", "flac", "ogg"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            workers: num_cpus::get(),
            seed: None,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("batch.workers", self.workers));
        }
        if self.video_extensions.is_empty() {
            return Err(invalid("batch.video_extensions", "[]"));
        }
        if self.music_extensions.is_empty() {
            return Err(invalid("batch.music_extensions", "[]"));
        }
        Ok(())
    }
}
