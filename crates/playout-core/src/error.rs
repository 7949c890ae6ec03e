//! Error types for Playout.

use thiserror::Error;

/// Result type alias using Playout's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Playout.
#[derive(Error, Debug)]
pub enum Error {
    // Setup errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("A file is already playing on this output")]
    AlreadyPlaying,

    #[error("Resource error: {0}")]
    Resource(String),

    // Audio errors
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Short read: expected {expected} frames, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

impl Error {
    /// Returns true if this error was caused by the caller's configuration
    /// rather than by the device, the file, or the system.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnsupportedFormat(_)
                | Self::FormatMismatch(_)
                | Self::AlreadyPlaying
        )
    }
}
