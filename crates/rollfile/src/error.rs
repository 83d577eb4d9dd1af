//! Error and Result types for rolling file operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for rolling file operations.
pub type Result<T> = std::result::Result<T, RollError>;

/// The error type for rolling file operations.
///
/// Only [`RollError::Config`] and [`RollError::Open`] are fatal. Rotation,
/// compression, and retention failures are reported through
/// [`StreamDelegate::on_error`](crate::StreamDelegate::on_error) and never
/// terminate the stream.
#[derive(Debug, Error)]
pub enum RollError {
    /// Invalid stream configuration (fatal at construction).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The active file could not be opened or created (fatal).
    #[error("Failed to open log file {path}: {source}")]
    Open {
        /// Path of the file that failed to open.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// Renaming the active file failed. The stream reopens the original
    /// file so no data is lost; the next threshold check retries.
    #[error("Failed to rotate log file: {0}")]
    Rotation(String),

    /// Compressing a rotated file failed. The uncompressed file stays on
    /// disk untouched.
    #[error("Failed to compress rotated file: {0}")]
    Compression(String),

    /// Deleting a single backup failed. Pruning continues for the
    /// remaining files.
    #[error("Failed to delete backup {path}: {source}")]
    Retention {
        /// Path of the backup that could not be deleted.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// Write after close.
    #[error("Stream is closed")]
    Closed,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
