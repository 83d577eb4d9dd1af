//! Per-instance event delegate and clock abstraction.
//!
//! Every stream carries its own delegate, passed at construction. There is
//! no process-wide signal: two streams never cross-signal each other.

use crate::error::RollError;
use crate::policy::RotationTrigger;
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// Emitted once per completed rotation, ordered relative to the writes
/// that preceded and followed it.
#[derive(Debug, Clone)]
pub struct RotationEvent {
    /// Path of the active file that was rotated (the configured base path).
    pub previous_path: PathBuf,
    /// Path the rotated data now lives under. When compression is enabled
    /// the file later gains a `.gz` suffix.
    pub new_path: PathBuf,
    /// What caused the rotation.
    pub trigger: RotationTrigger,
    /// When the rotation completed.
    pub timestamp: DateTime<Local>,
}

/// Callbacks a stream invokes as it writes and rotates.
///
/// All methods default to no-ops; implement only what you observe.
/// Callbacks run on the stream's writer thread (or, for
/// [`on_pause`](StreamDelegate::on_pause) with `true`, on the caller's
/// thread), so implementations must be `Send + Sync` and fast.
pub trait StreamDelegate: Send + Sync {
    /// A rotation completed.
    fn on_rotation(&self, _event: &RotationEvent) {}

    /// The pending-write queue drained to empty after saturation; all
    /// buffered records are on disk.
    fn on_drain(&self) {}

    /// Backpressure toggled: `true` when the queue crossed the high water
    /// mark, `false` once it drained.
    fn on_pause(&self, _paused: bool) {}

    /// A recoverable error occurred (rotation, compression, retention, or
    /// a write failure). The stream keeps running.
    fn on_error(&self, _error: &RollError) {}
}

/// Delegate that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl StreamDelegate for NoopDelegate {}

/// Time source for date-token evaluation, injectable for tests.
pub trait Clock: Send + Sync {
    /// Returns the current local time.
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
