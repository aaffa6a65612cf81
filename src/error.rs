//! Error types for controller construction and persistence.

use thiserror::Error;

/// Errors surfaced by the training controller.
///
/// Numeric trouble inside a network (NaN, divergence) is not represented here;
/// the controller treats the running error as an opaque scalar.
#[derive(Debug, Error)]
pub enum DeepLearnError {
    /// Rejected construction parameters (threshold count, unit counts).
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A persisted stream ended early or holds values that cannot be represented.
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// Underlying stream failure while writing or opening a checkpoint.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DeepLearnResult<T> = Result<T, DeepLearnError>;

impl DeepLearnError {
    /// Classify an I/O error raised while reading a persisted controller.
    ///
    /// Underruns and malformed fields become `CorruptState`; anything else
    /// is a genuine stream failure.
    pub(crate) fn from_read(err: std::io::Error, context: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData => {
                DeepLearnError::CorruptState(format!("{context}: {err}"))
            }
            _ => DeepLearnError::Io(err),
        }
    }
}
