//! Error types for the rolling file writer
//!
//! Failures caused directly by a caller (open, write, forced rollover) are
//! returned as [`RolloverError`]. Failures on the background paths
//! (scheduled rollover, compression, retention) are logged instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for rolling writer operations
pub type RolloverResult<T> = Result<T, RolloverError>;

/// Errors that can occur while writing, rolling over or archiving
#[derive(Debug, Error)]
pub enum RolloverError {
    /// Invalid or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Append is disabled and the target file already exists
    #[error("Path conflict: {} already exists and append is disabled", path.display())]
    PathConflict { path: PathBuf },

    /// I/O failure on the writer's own path
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Gzip compression of an archive failed
    #[error("Compression failed for {}: {source}", path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Deleting an expired archive failed
    #[error("Retention sweep failed for {}: {source}", path.display())]
    Retention {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A previous reopen failed; the writer has no usable file
    #[error("No active file: reopening {} failed, waiting for next rollover", path.display())]
    NoActiveFile { path: PathBuf },

    /// The writer has been closed
    #[error("Writer is closed")]
    Closed,

    /// The message handler was not started
    #[error("Handler is not running")]
    NotRunning,

    /// Payload shape outside of text / bytes
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// JSON decoding error (config files, payloads)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<io::Error> for RolloverError {
    fn from(err: io::Error) -> Self {
        RolloverError::Io {
            context: "accessing the filesystem".to_string(),
            source: err,
        }
    }
}

impl RolloverError {
    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap an I/O error with a description of what was being done
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Extension for attaching context to `io::Result`
pub(crate) trait IoContext<T> {
    fn context(self, context: impl FnOnce() -> String) -> RolloverResult<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, context: impl FnOnce() -> String) -> RolloverResult<T> {
        self.map_err(|source| RolloverError::io(context(), source))
    }
}
