//! Error types for melnet-rs.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Audio processing error (WAV I/O, STFT, resampling).
    #[error("audio: {0}")]
    Audio(String),

    /// Dataset enumeration error (missing transcript, unreadable layout).
    #[error("dataset: {0}")]
    Dataset(String),

    /// Invalid configuration. Raised at setup, before any batch is processed.
    #[error("config: {0}")]
    Config(String),

    /// Tensor shape mismatch. Fatal per call, never silently broadcast.
    #[error("shape: {0}")]
    Shape(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}
