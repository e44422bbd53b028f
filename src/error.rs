//! Centralized error types for mailsift.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsift library.
#[derive(Error, Debug)]
pub enum SearchError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The snapshot file is corrupt, stale, or was written by an incompatible version.
    #[error("Corrupt or incompatible snapshot '{path}': {reason}")]
    InvalidSnapshot { path: PathBuf, reason: String },

    /// A line of the mailbox change feed could not be decoded.
    #[error("Invalid feed entry on line {line}: {reason}")]
    InvalidFeed { line: usize, reason: String },

    /// A posting references a message the index no longer holds.
    ///
    /// Fatal to the index instance: the only recovery is a full resync.
    #[error("Inconsistent index: token '{token}' references missing message '{message_id}'")]
    InconsistentIndexState { token: String, message_id: String },

    /// Binary (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for `Result<T, SearchError>`.
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the index must be rebuilt from scratch.
    pub fn requires_resync(&self) -> bool {
        matches!(self, Self::InconsistentIndexState { .. })
    }
}

impl From<bincode::Error> for SearchError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
