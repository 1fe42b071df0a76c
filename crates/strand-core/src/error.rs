//! Error types for Strand.

use thiserror::Error;

use crate::types::{AudioCodec, SampleFormat};

/// Result type alias using Strand's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Strand.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("No codec mapping for '{0}'")]
    UnknownCodec(AudioCodec),

    #[error("Codec backend unavailable: {0}")]
    CodecUnavailable(String),

    #[error("Sample rate {0} is not supported by this codec")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(SampleFormat),

    // Codec runtime errors
    #[error("Codec backend error: {0}")]
    Backend(String),

    #[error("Sample count mismatch: expected {expected}, got {provided}")]
    SampleCountMismatch { expected: usize, provided: usize },

    #[error("Frame plane {0} is shared and not writable")]
    FrameNotWritable(usize),

    #[error("Buffer too small: need {needed} bytes, capacity {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Component is not initialized")]
    NotInitialized,

    // Audio errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    // Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Returns true if the error was raised while validating a configuration,
    /// before any codec resources were opened.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownCodec(_)
                | Self::CodecUnavailable(_)
                | Self::UnsupportedSampleRate(_)
                | Self::UnsupportedFormat(_)
        )
    }
}
