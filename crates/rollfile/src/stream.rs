//! Rolling file write stream.
//!
//! The stream owns the active file through a dedicated writer thread that
//! serializes every mutation: appends, rotations, retention, and the
//! hand-off to the compression worker. Producers enqueue records over a
//! channel; the channel is the single ordered pending buffer, covering
//! both in-rotation buffering and backpressure buffering, so arrival
//! order is preserved across either.
//!
//! ```text
//! write(bytes) → queue → [writer thread] policy check → rotate? → append
//!                                         │
//!                                         ├── rename + retention prune
//!                                         └── compression worker (async)
//! ```

use crate::compress::CompressionWorker;
use crate::error::{Result, RollError};
use crate::events::{Clock, NoopDelegate, RotationEvent, StreamDelegate, SystemClock};
use crate::filename::{FileNameOptions, FileNamePattern};
use crate::policy::{is_valid_pattern, RollingPolicy, RotationTrigger};
use crate::retention::BackupRetention;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, warn};

/// Default number of rotated generations to keep.
pub const DEFAULT_NUM_BACKUPS: usize = 5;

/// Default queued-byte threshold beyond which `write` signals
/// backpressure (16 KiB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Default separator joining rotated-name parts.
pub const DEFAULT_FILE_NAME_SEP: &str = ".";

/// Configuration for a [`RollingFileWriteStream`].
///
/// At least one of `max_size` and `pattern` must be set, otherwise
/// rotation would never trigger and construction fails with
/// [`RollError::Config`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base path of the active log file.
    pub path: PathBuf,
    /// Size threshold in bytes; a write that would push the active file
    /// past it rotates first. `None` disables the size trigger.
    pub max_size: Option<u64>,
    /// strftime pattern for the date trigger, e.g. `"%Y-%m-%d"`. A write
    /// rotates when the formatted token differs from the active file's.
    /// `None` disables the date trigger.
    pub pattern: Option<String>,
    /// Number of rotated generations retention keeps.
    pub num_backups: usize,
    /// gzip rotated files in the background.
    pub compress: bool,
    /// Keep the original extension at the end of rotated names
    /// (`app.1.log` instead of `app.log.1`).
    pub keep_file_ext: bool,
    /// Separator joining rotated-name parts.
    pub file_name_sep: String,
    /// Include the date token even in the index-0 name.
    pub always_include_date: bool,
    /// Unix permission bits applied when creating files.
    pub mode: Option<u32>,
    /// Queued-byte threshold beyond which [`write`] returns `false`.
    ///
    /// [`write`]: RollingFileWriteStream::write
    pub high_water_mark: usize,
}

impl StreamConfig {
    /// Creates a configuration with defaults and no trigger set; set
    /// `max_size` and/or `pattern` before constructing a stream.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: None,
            pattern: None,
            num_backups: DEFAULT_NUM_BACKUPS,
            compress: false,
            keep_file_ext: false,
            file_name_sep: DEFAULT_FILE_NAME_SEP.to_string(),
            always_include_date: false,
            mode: None,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }

    /// Legacy size+backups form: rotate past `max_size` bytes, keep
    /// `num_backups` generations.
    pub fn size_rotated(path: impl Into<PathBuf>, max_size: u64, num_backups: usize) -> Self {
        Self::new(path)
            .with_max_size(max_size)
            .with_num_backups(num_backups)
    }

    /// Legacy pattern+daysToKeep form: rotate on date boundaries of
    /// `pattern`; `days_to_keep` maps 1:1 onto the backup count.
    pub fn date_rotated(
        path: impl Into<PathBuf>,
        pattern: impl Into<String>,
        days_to_keep: usize,
    ) -> Self {
        Self::new(path)
            .with_pattern(pattern)
            .with_num_backups(days_to_keep)
    }

    /// Sets the size threshold.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the date pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets the retention count.
    pub fn with_num_backups(mut self, num_backups: usize) -> Self {
        self.num_backups = num_backups;
        self
    }

    /// Enables or disables background gzip of rotated files.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Keeps the original extension at the end of rotated names.
    pub fn with_keep_file_ext(mut self, keep_file_ext: bool) -> Self {
        self.keep_file_ext = keep_file_ext;
        self
    }

    /// Sets the separator joining rotated-name parts.
    pub fn with_file_name_sep(mut self, sep: impl Into<String>) -> Self {
        self.file_name_sep = sep.into();
        self
    }

    /// Includes the date token even in the index-0 name.
    pub fn with_always_include_date(mut self, always: bool) -> Self {
        self.always_include_date = always;
        self
    }

    /// Sets unix permission bits for created files.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the backpressure threshold in queued bytes.
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_size.is_none() && self.pattern.is_none() {
            return Err(RollError::Config(
                "at least one of max_size and pattern must be set".to_string(),
            ));
        }
        if self.max_size == Some(0) {
            return Err(RollError::Config("max_size must be positive".to_string()));
        }
        if let Some(pattern) = &self.pattern {
            if !is_valid_pattern(pattern) {
                return Err(RollError::Config(format!("invalid date pattern {pattern:?}")));
            }
        }
        if self.file_name_sep.is_empty() {
            return Err(RollError::Config("file_name_sep must not be empty".to_string()));
        }
        Ok(())
    }
}

/// State of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    /// Writes reach the file handle.
    Open = 0,
    /// A rotation is in flight; writes queue behind it.
    Rotating = 1,
    /// Terminal; all writes are rejected.
    Closed = 2,
}

struct Shared {
    state: AtomicU8,
    pending_bytes: AtomicUsize,
    saturated: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Open as u8),
            pending_bytes: AtomicUsize::new(0),
            saturated: AtomicBool::new(false),
        }
    }

    fn state(&self) -> StreamState {
        match self.state.load(Ordering::Acquire) {
            0 => StreamState::Open,
            1 => StreamState::Rotating,
            _ => StreamState::Closed,
        }
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

enum Command {
    Write(Vec<u8>),
    Flush(mpsc::Sender<Result<()>>),
    Rotate(mpsc::Sender<Result<()>>),
    Close,
}

/// A write stream that appends records to an active file and rotates it
/// on size or date thresholds, pruning and optionally compressing old
/// generations.
///
/// All file mutation runs on a dedicated writer thread; `write` merely
/// enqueues, so it can be called from several threads and records land
/// in arrival order. [`flush`](Self::flush) round-trips the queue when a
/// caller needs the bytes on disk.
pub struct RollingFileWriteStream {
    path: PathBuf,
    tx: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    delegate: Arc<dyn StreamDelegate>,
    high_water_mark: usize,
    worker: Option<thread::JoinHandle<()>>,
}

impl RollingFileWriteStream {
    /// Opens a stream with no event delegate.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Config`] for an invalid configuration and
    /// [`RollError::Open`] when the active file cannot be opened.
    pub fn new(config: StreamConfig) -> Result<Self> {
        Self::build(config, Arc::new(NoopDelegate), Arc::new(SystemClock))
    }

    /// Opens a stream that reports events to `delegate`.
    pub fn with_delegate(config: StreamConfig, delegate: Arc<dyn StreamDelegate>) -> Result<Self> {
        Self::build(config, delegate, Arc::new(SystemClock))
    }

    /// Opens a stream with an explicit clock, for deterministic
    /// date-trigger behavior in tests.
    pub fn with_clock(
        config: StreamConfig,
        delegate: Arc<dyn StreamDelegate>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::build(config, delegate, clock)
    }

    fn build(
        config: StreamConfig,
        delegate: Arc<dyn StreamDelegate>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared::new());
        let worker = Worker::open(&config, delegate.clone(), clock, shared.clone())?;
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("rollfile-writer".to_string())
            .spawn(move || worker.run(rx))?;
        Ok(Self {
            path: config.path,
            tx,
            shared,
            delegate,
            high_water_mark: config.high_water_mark,
            worker: Some(handle),
        })
    }

    /// Enqueues a record. Returns `false` when the queue has crossed the
    /// high water mark — the caller should pause until
    /// [`on_drain`](StreamDelegate::on_drain) fires. The record itself is
    /// still accepted and will be written in order.
    ///
    /// Records are opaque bytes: any text encoding is applied by the
    /// caller before handing the record over.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Closed`] after [`close`](Self::close).
    pub fn write(&self, bytes: &[u8]) -> Result<bool> {
        if self.shared.state() == StreamState::Closed {
            return Err(RollError::Closed);
        }
        let len = bytes.len();
        // Account before enqueueing so the worker's decrement can never
        // observe a count it outruns.
        let pending = self.shared.pending_bytes.fetch_add(len, Ordering::AcqRel) + len;
        let saturated = pending > self.high_water_mark;
        if saturated && !self.shared.saturated.swap(true, Ordering::AcqRel) {
            self.delegate.on_pause(true);
        }
        if self.tx.send(Command::Write(bytes.to_vec())).is_err() {
            self.shared.pending_bytes.fetch_sub(len, Ordering::AcqRel);
            return Err(RollError::Closed);
        }
        Ok(!saturated)
    }

    /// Waits until every previously queued record is flushed and synced
    /// to disk.
    pub fn flush(&self) -> Result<()> {
        self.round_trip(Command::Flush)
    }

    /// Forces an immediate rotation, even with zero bytes written since
    /// the last one. The rotated file is named exactly as a
    /// threshold-triggered rotation would name it.
    pub fn rotate(&self) -> Result<()> {
        self.round_trip(Command::Rotate)
    }

    fn round_trip(&self, command: fn(mpsc::Sender<Result<()>>) -> Command) -> Result<()> {
        if self.shared.state() == StreamState::Closed {
            return Err(RollError::Closed);
        }
        let (ack_tx, ack_rx) = mpsc::channel();
        self.tx
            .send(command(ack_tx))
            .map_err(|_| RollError::Closed)?;
        ack_rx.recv().map_err(|_| RollError::Closed)?
    }

    /// Closes the stream: rejects new writes, drains queued records,
    /// syncs the file, and lets queued compression jobs finish.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.shared.set_state(StreamState::Closed);
        let _ = self.tx.send(Command::Close);
        if let Some(handle) = self.worker.take() {
            handle.join().map_err(|_| {
                RollError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "writer thread panicked",
                ))
            })?;
        }
        Ok(())
    }

    /// The configured base path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state of the stream.
    pub fn state(&self) -> StreamState {
        self.shared.state()
    }
}

impl Drop for RollingFileWriteStream {
    fn drop(&mut self) {
        // Best effort, mirroring an explicit close.
        let _ = self.close();
    }
}

struct Worker {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    current_size: u64,
    last_date_token: Option<String>,
    mode: Option<u32>,
    policy: RollingPolicy,
    pattern: FileNamePattern,
    retention: BackupRetention,
    compression: Option<CompressionWorker>,
    delegate: Arc<dyn StreamDelegate>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl Worker {
    fn open(
        config: &StreamConfig,
        delegate: Arc<dyn StreamDelegate>,
        clock: Arc<dyn Clock>,
        shared: Arc<Shared>,
    ) -> Result<Self> {
        let pattern = FileNamePattern::new(
            &config.path,
            FileNameOptions {
                sep: config.file_name_sep.clone(),
                keep_file_ext: config.keep_file_ext,
                needs_index: config.max_size.is_some(),
                always_include_date: config.always_include_date,
                date_pattern: config.pattern.clone(),
            },
        )?;
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| RollError::Open {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let compression = if config.compress {
            Some(CompressionWorker::spawn(delegate.clone())?)
        } else {
            None
        };

        let mut worker = Self {
            path: config.path.clone(),
            file: None,
            current_size: 0,
            last_date_token: None,
            mode: config.mode,
            policy: RollingPolicy::new(config.max_size, config.pattern.clone()),
            pattern: pattern.clone(),
            retention: BackupRetention::new(pattern, config.num_backups),
            compression,
            delegate,
            clock,
            shared,
        };
        worker.open_active()?;
        worker.last_date_token = worker.initial_date_token();
        Ok(worker)
    }

    fn run(mut self, rx: mpsc::Receiver<Command>) {
        while let Ok(command) = rx.recv() {
            match command {
                Command::Write(bytes) => self.handle_write(bytes),
                Command::Flush(ack) => {
                    let _ = ack.send(self.flush_file());
                }
                Command::Rotate(ack) => {
                    let _ = ack.send(self.rotate(RotationTrigger::Manual));
                }
                Command::Close => break,
            }
        }
        // Writes that raced with close are still drained, in order.
        while let Ok(command) = rx.try_recv() {
            if let Command::Write(bytes) = command {
                self.handle_write(bytes);
            }
        }
        if let Err(err) = self.flush_file() {
            warn!("Failed to flush on close: {err}");
            self.delegate.on_error(&err);
        }
        if let Some(mut compression) = self.compression.take() {
            compression.shutdown();
        }
        self.shared.set_state(StreamState::Closed);
    }

    fn handle_write(&mut self, bytes: Vec<u8>) {
        let now = self.clock.now();
        let due = self.policy.should_rotate(
            self.current_size,
            bytes.len() as u64,
            now,
            self.last_date_token.as_deref(),
        );
        if let Some(trigger) = due {
            if let Err(err) = self.rotate(trigger) {
                warn!("Rotation failed: {err}");
                self.delegate.on_error(&err);
            }
        }
        if let Err(err) = self.append(&bytes) {
            warn!("Append failed: {err}");
            self.delegate.on_error(&err);
        }
        self.finish_record(bytes.len());
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(RollError::Closed)?;
        file.write_all(bytes)?;
        self.current_size += bytes.len() as u64;
        Ok(())
    }

    fn finish_record(&mut self, len: usize) {
        let remaining = self.shared.pending_bytes.fetch_sub(len, Ordering::AcqRel) - len;
        if remaining == 0 && self.shared.saturated.swap(false, Ordering::AcqRel) {
            // Put the buffered bytes on disk before announcing the drain.
            if let Err(err) = self.flush_file() {
                self.delegate.on_error(&err);
            }
            self.delegate.on_drain();
            self.delegate.on_pause(false);
        }
    }

    fn rotate(&mut self, trigger: RotationTrigger) -> Result<()> {
        self.shared.set_state(StreamState::Rotating);
        let result = self.rotate_inner(trigger);
        let next = if self.file.is_some() {
            StreamState::Open
        } else {
            StreamState::Closed
        };
        self.shared.set_state(next);
        result
    }

    fn rotate_inner(&mut self, trigger: RotationTrigger) -> Result<()> {
        self.flush_file()?;
        self.file = None;

        let token = self.last_date_token.clone();
        // Rotated generations start at index 1; the formatter decides
        // whether the index shows up in the name. Index 0 would format
        // back to the base name and turn the rename into a no-op.
        let index = match self.pattern.next_index(token.as_deref()) {
            Ok(index) => index,
            Err(err) => {
                self.open_active()?;
                return Err(RollError::Rotation(format!(
                    "scan {}: {err}",
                    self.pattern.dir().display()
                )));
            }
        };
        let rotated = self.pattern.format(index, token.as_deref());

        if let Err(err) = fs::rename(&self.path, &rotated) {
            // Reopen the original so nothing is lost; the next threshold
            // check retries.
            self.open_active()?;
            return Err(RollError::Rotation(format!(
                "rename {} -> {}: {err}",
                self.path.display(),
                rotated.display()
            )));
        }
        debug!(
            from = %self.path.display(),
            to = %rotated.display(),
            ?trigger,
            "Rotated log file"
        );

        if let Some(compression) = &self.compression {
            compression.submit(rotated.clone());
        }

        // Paths still with the compression worker (including the one just
        // submitted) are off-limits to this pruning pass.
        let in_flight = match &self.compression {
            Some(compression) => compression.in_flight(),
            None => HashSet::new(),
        };
        match self.retention.prune_excluding(&in_flight) {
            Ok(outcome) => {
                for (path, source) in outcome.failures {
                    self.delegate.on_error(&RollError::Retention { path, source });
                }
            }
            Err(err) => self.delegate.on_error(&RollError::Io(err)),
        }

        let now = self.clock.now();
        self.open_active()?;
        self.last_date_token = self.policy.date_token(now);

        let event = RotationEvent {
            previous_path: self.path.clone(),
            new_path: rotated,
            trigger,
            timestamp: now,
        };
        self.delegate.on_rotation(&event);
        Ok(())
    }

    fn open_active(&mut self) -> Result<()> {
        let file = open_append(&self.path, self.mode).map_err(|source| RollError::Open {
            path: self.path.clone(),
            source,
        })?;
        let metadata = file.metadata().map_err(|source| RollError::Open {
            path: self.path.clone(),
            source,
        })?;
        self.current_size = metadata.len();
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    /// Resumes the period of the data already in the file, so a restart
    /// mid-period does not rotate spuriously and a restart across a
    /// boundary rotates under the old period's token.
    fn initial_date_token(&self) -> Option<String> {
        if self.current_size > 0 {
            if let Ok(metadata) = fs::metadata(&self.path) {
                if let Ok(modified) = metadata.modified() {
                    return self.policy.date_token(DateTime::<Local>::from(modified));
                }
            }
        }
        self.policy.date_token(self.clock.now())
    }

    fn flush_file(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
            file.get_ref().sync_all()?;
        }
        Ok(())
    }
}

fn open_append(path: &Path, mode: Option<u32>) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}
