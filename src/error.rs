use thiserror::Error;

/// Main error type for the shorts compositor
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Video-specific errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to decode video file {path}: {reason}")]
    DecodeFailed { path: String, reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Dimension mismatch: {details}")]
    DimensionMismatch { details: String },

    #[error("Invalid stream parameters: {details}")]
    InvalidParameters { details: String },
}

/// Audio-specific errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio format mismatch: {details}")]
    FormatMismatch { details: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Composition-specific errors
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("No {kind} files found in directory: {path}")]
    EmptyPool { kind: String, path: String },

    #[error("Layer {index} is invalid: {reason}")]
    InvalidLayer { index: usize, reason: String },

    #[error("Invalid composition parameters: {details}")]
    InvalidParameters { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Structural errors abort the whole batch; everything else only skips the item
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            Self::Composition(CompositionError::EmptyPool { .. })
                | Self::Composition(CompositionError::InvalidParameters { .. })
                | Self::Config(_)
        )
    }

    /// True when the error came from an empty reaction or music pool
    pub fn is_empty_pool(&self) -> bool {
        matches!(self, Self::Composition(CompositionError::EmptyPool { .. }))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Video(VideoError::DecodeFailed { path, .. }) => {
                format!(
                    "Could not decode '{}'. Please check the file exists and is a playable video.",
                    path
                )
            }
            Self::Audio(AudioError::LoadFailed { path }) => {
                format!(
                    "Could not load audio file '{}'. \
                     Please check the file exists and is a supported format.",
                    path
                )
            }
            Self::Composition(CompositionError::EmptyPool { kind, path }) => {
                format!("No {} files found in '{}'; nothing to pick from.", kind, path)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
