//! # Audio Module
//!
//! Decoded audio as immutable [`AudioStream`] values, file loading, and the
//! [`AudioMixer`] that fits every track to the composition duration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shorts_compositor::audio::{AudioFormat, AudioLoader, AudioMixer, AudioTrack};
//!
//! # fn main() -> shorts_compositor::Result<()> {
//! let music = AudioLoader::load("music/track.mp3")?;
//!
//! let mixer = AudioMixer::new(AudioFormat::default())?;
//! let mixed = mixer.mix(&[AudioTrack::new(music, 0.4)?], 25.0)?;
//! assert_eq!(mixed.duration(), 25.0);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod mixer;
pub mod types;

pub use loader::{write_wav, AudioLoader};
pub use mixer::{AudioMixer, AudioTrack};
pub use types::{AudioFormat, AudioStream};
