//! Retention pruning for rotated backup files.
//!
//! Pruning is best-effort: a file that cannot be deleted is reported and
//! skipped, and the next rotation retries the full pass.

use crate::filename::{BackupFile, FileNamePattern};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Result of one pruning pass.
#[derive(Debug, Default)]
pub struct PruneOutcome {
    /// Backups deleted, oldest first.
    pub deleted: Vec<PathBuf>,
    /// Backups that could not be deleted, with the per-file error.
    pub failures: Vec<(PathBuf, io::Error)>,
}

/// Deletes the oldest rotated generations beyond the configured count.
#[derive(Debug, Clone)]
pub struct BackupRetention {
    pattern: FileNamePattern,
    num_backups: usize,
}

impl BackupRetention {
    /// Creates a retention pass over the generations of `pattern`.
    pub fn new(pattern: FileNamePattern, num_backups: usize) -> Self {
        Self {
            pattern,
            num_backups,
        }
    }

    /// Scans the directory and deletes every backup beyond the
    /// `num_backups` most recent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error only when the directory itself cannot be listed;
    /// per-file deletion failures are collected in the outcome instead.
    pub fn prune(&self) -> io::Result<PruneOutcome> {
        self.prune_excluding(&HashSet::new())
    }

    /// Like [`prune`](Self::prune), but treats the `in_flight` paths as
    /// invisible. A backup queued for (or undergoing) compression is
    /// neither counted nor deleted; the next pass picks it up once its
    /// `.gz` has replaced it. Without this a pass could count one
    /// generation twice while both forms exist, or delete a file the
    /// compression worker is about to open.
    pub fn prune_excluding(&self, in_flight: &HashSet<PathBuf>) -> io::Result<PruneOutcome> {
        let mut backups = self.pattern.scan()?;
        backups.retain(|backup| !in_flight.contains(&backup.path));
        sort_newest_first(&mut backups);

        let mut outcome = PruneOutcome::default();
        let victims = backups.get(self.num_backups..).unwrap_or(&[]);
        for victim in victims.iter().rev() {
            match fs::remove_file(&victim.path) {
                Ok(()) => {
                    debug!(path = %victim.path.display(), "Pruned backup");
                    outcome.deleted.push(victim.path.clone());
                }
                // Already gone, e.g. replaced by its compressed sibling.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %victim.path.display(), "Failed to prune backup: {err}");
                    outcome.failures.push((victim.path.clone(), err));
                }
            }
        }
        Ok(outcome)
    }
}

/// Orders by recency: date token first (tokens from one pattern are
/// zero-padded, so lexicographic order is chronological), index as the
/// tie-break. Higher index means newer generation.
fn sort_newest_first(backups: &mut [BackupFile]) {
    backups.sort_by(|a, b| {
        let key_a = (a.date_token.as_deref().unwrap_or(""), a.index);
        let key_b = (b.date_token.as_deref().unwrap_or(""), b.index);
        key_b.cmp(&key_a)
    });
}
