//! Error types for the viseme pipeline.

/// Top-level error type for viseme timeline generation.
#[derive(Debug, thiserror::Error)]
pub enum VisemeError {
    /// A caller broke the contract (bad duration, empty text, unknown mode).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The external phonemizer failed, timed out, or produced unusable output.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Keyframe store read/write error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VisemeError>;
