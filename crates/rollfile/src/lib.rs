//! Rollfile - Rolling Log File Writer
//!
//! This crate provides an append-only file stream that rotates the active
//! file on size or date thresholds, keeps a bounded number of rotated
//! generations, and optionally gzips them in the background.
//!
//! # Components
//!
//! - [`RollingFileWriteStream`]: the write stream, backed by a dedicated writer thread
//! - [`StreamConfig`]: construction options, including legacy size/date forms
//! - [`FileNamePattern`]: bidirectional rotated-name formatting and parsing
//! - [`RollingPolicy`] / [`BackupRetention`]: trigger evaluation and pruning
//! - [`StreamDelegate`]: rotation, drain, and error notifications
//!
//! # Example
//!
//! ```rust,ignore
//! use rollfile::{RollingFileWriteStream, StreamConfig};
//!
//! // Rotate past 10 MiB, keep 5 backups, gzip old generations.
//! let config = StreamConfig::size_rotated("logs/app.log", 10 * 1024 * 1024, 5)
//!     .with_compress(true);
//! let mut stream = RollingFileWriteStream::new(config)?;
//!
//! let keep_going = stream.write(b"hello\n")?;
//! if !keep_going {
//!     // Queue is past the high water mark; wait for on_drain.
//! }
//!
//! stream.close()?;
//! ```

#![deny(missing_docs)]

pub mod compress;
pub mod error;
pub mod events;
pub mod filename;
pub mod policy;
pub mod retention;
pub mod stream;

pub use compress::CompressionWorker;
pub use error::{Result, RollError};
pub use events::{Clock, NoopDelegate, RotationEvent, StreamDelegate, SystemClock};
pub use filename::{BackupFile, FileNameOptions, FileNamePattern};
pub use policy::{RollingPolicy, RotationTrigger};
pub use retention::{BackupRetention, PruneOutcome};
pub use stream::{
    RollingFileWriteStream, StreamConfig, StreamState, DEFAULT_FILE_NAME_SEP,
    DEFAULT_HIGH_WATER_MARK, DEFAULT_NUM_BACKUPS,
};
