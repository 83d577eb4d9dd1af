//! Background gzip compression of rotated files.
//!
//! A rotated file is handed to the worker right after the rename; the
//! write path never waits on it. The worker streams the file into a
//! `.gz` sibling and deletes the original only once the compressed copy
//! is flushed and synced. On any error the uncompressed file is left
//! untouched and the failure is reported through the delegate.

use crate::error::{Result, RollError};
use crate::events::StreamDelegate;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, warn};

/// Compresses rotated files on a dedicated thread.
///
/// Jobs are processed one at a time in submission order, so a path is
/// never compressed twice concurrently. Paths between `submit` and job
/// completion are tracked in an in-flight set that retention consults,
/// so pruning never races a file the worker is about to open or is
/// mid-way through replacing with its `.gz`.
pub struct CompressionWorker {
    tx: Option<mpsc::Sender<PathBuf>>,
    handle: Option<thread::JoinHandle<()>>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl CompressionWorker {
    /// Spawns the worker thread. Errors go to `delegate.on_error` as
    /// [`RollError::Compression`].
    pub fn spawn(delegate: Arc<dyn StreamDelegate>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<PathBuf>();
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let worker_set = in_flight.clone();
        let handle = thread::Builder::new()
            .name("rollfile-gzip".to_string())
            .spawn(move || {
                while let Ok(path) = rx.recv() {
                    match compress_file(&path) {
                        Ok(()) => debug!(path = %path.display(), "Compressed rotated file"),
                        Err(err) => {
                            warn!(path = %path.display(), "Compression failed: {err}");
                            delegate.on_error(&err);
                        }
                    }
                    // Cleared only once the `.gz` has replaced the
                    // original (or the original is known untouched), so
                    // the path is visible to retention again in exactly
                    // one of its two forms.
                    lock_set(&worker_set).remove(&path);
                }
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            in_flight,
        })
    }

    /// Enqueues a rotated file for compression without waiting.
    pub fn submit(&self, path: PathBuf) {
        if let Some(tx) = &self.tx {
            lock_set(&self.in_flight).insert(path.clone());
            // Send only fails when the worker is gone; the uncompressed
            // file then simply stays on disk.
            if let Err(mpsc::SendError(path)) = tx.send(path) {
                lock_set(&self.in_flight).remove(&path);
            }
        }
    }

    /// Snapshot of the paths queued or being compressed right now.
    pub fn in_flight(&self) -> HashSet<PathBuf> {
        lock_set(&self.in_flight).clone()
    }

    /// Lets queued jobs finish, then joins the worker thread. Jobs are
    /// never cancelled.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CompressionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_set(set: &Mutex<HashSet<PathBuf>>) -> MutexGuard<'_, HashSet<PathBuf>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

fn compress_file(path: &Path) -> Result<()> {
    let target = gz_path(path);
    let source = File::open(path)
        .map_err(|err| RollError::Compression(format!("open {}: {err}", path.display())))?;
    let dest = File::create(&target)
        .map_err(|err| RollError::Compression(format!("create {}: {err}", target.display())))?;

    let mut reader = BufReader::new(source);
    let mut encoder = GzEncoder::new(dest, Compression::default());
    let written = io::copy(&mut reader, &mut encoder)
        .and_then(|_| encoder.finish())
        .and_then(|file| file.sync_all());

    if let Err(err) = written {
        // Leave the uncompressed original in place; drop the partial copy.
        let _ = fs::remove_file(&target);
        return Err(RollError::Compression(format!(
            "compress {}: {err}",
            path.display()
        )));
    }

    fs::remove_file(path).map_err(|err| {
        RollError::Compression(format!("remove original {}: {err}", path.display()))
    })
}
