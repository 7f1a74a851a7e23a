//! Error types for sequence tracking

use thiserror::Error;

/// Result type alias for stepgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or driving a sequence
///
/// Locked-step navigation is not an error: it is reported as an
/// `AccessDenied` event and the call returns normally.
#[derive(Error, Debug)]
pub enum Error {
    /// Sequence input is malformed (empty, duplicate or non-contiguous order)
    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    /// Navigation to an index outside the sequence
    #[error("Step index {index} out of range (sequence has {len} steps)")]
    InvalidStepIndex { index: usize, len: usize },

    /// A step id that does not belong to the sequence
    #[error("Unknown step id: {0}")]
    UnknownStep(String),

    /// The step's source could not be classified to a playback strategy
    #[error("Unsupported media source: {0}")]
    UnsupportedSource(String),

    /// A persisted snapshot does not match the sequence it is restored into
    #[error("Snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    /// Ledger storage failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Network error while probing a source
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// JSON (de)serialization failure
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_mentions_bounds() {
        let err = Error::InvalidStepIndex { index: 7, len: 3 };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn json_errors_convert() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
