//! Bidirectional rotated-file name encoding.
//!
//! Rotated names are both generated (to pick a rename target) and parsed
//! back (to resume numbering after a restart and to select retention
//! victims), so [`FileNamePattern`] carries both directions and the
//! round-trip `parse(format(i, d)) == (i, d)` holds for every
//! index-bearing name it produces. The one deliberate asymmetry is the
//! bare dated name: it is written as the first generation of its period
//! but parses with index 0, and [`FileNamePattern::next_index`] accounts
//! for that.
//!
//! Composition depends on `keep_file_ext`. With base `app.log`,
//! separator `.`, date token `2024-05-01` and index 2:
//!
//! ```text
//! keep_file_ext = true    app.2024-05-01.2.log     (parts before the extension)
//! keep_file_ext = false   app.log.2024-05-01.2     (parts appended after it)
//! ```
//!
//! The compression suffix `.gz` is appended by the compression worker
//! after the rename; the parser strips it and reports `compressed`.

use crate::error::{Result, RollError};
use chrono::format::{parse as chrono_parse, Parsed, StrftimeItems};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file on disk recognized as a generation of the base file.
///
/// Index 0 denotes the active (unrotated) file; indices >= 1 are rotated
/// generations. New rotations take `max(existing index) + 1`, so a higher
/// index is a newer generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// Rotation index parsed from the name (0 when absent).
    pub index: u64,
    /// Date token parsed from the name, if any.
    pub date_token: Option<String>,
    /// Whether the file carries a `.gz` suffix.
    pub compressed: bool,
}

/// Naming options, mirroring the stream configuration fields that shape
/// rotated file names.
#[derive(Debug, Clone)]
pub struct FileNameOptions {
    /// Separator joining name parts (default `.`).
    pub sep: String,
    /// Keep the original extension at the end of rotated names.
    pub keep_file_ext: bool,
    /// Number size-triggered rotations (true when a size threshold is
    /// configured).
    pub needs_index: bool,
    /// Include the date token even for index 0.
    pub always_include_date: bool,
    /// strftime pattern the date token is formatted with, if any.
    pub date_pattern: Option<String>,
}

impl Default for FileNameOptions {
    fn default() -> Self {
        Self {
            sep: ".".to_string(),
            keep_file_ext: false,
            needs_index: true,
            always_include_date: false,
            date_pattern: None,
        }
    }
}

/// Formatter and parser for rotated file names of one base file.
#[derive(Debug, Clone)]
pub struct FileNamePattern {
    dir: PathBuf,
    base_name: String,
    stem: String,
    extension: String,
    opts: FileNameOptions,
}

impl FileNamePattern {
    /// Creates a pattern for the given base path.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Config`] when the path has no file name or the
    /// separator is empty.
    pub fn new(base_path: &Path, opts: FileNameOptions) -> Result<Self> {
        let base_name = base_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                RollError::Config(format!("base path {} has no file name", base_path.display()))
            })?;
        if opts.sep.is_empty() {
            return Err(RollError::Config("file name separator is empty".to_string()));
        }

        let stem = base_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&base_name)
            .to_string();
        let extension = base_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_string();
        let dir = match base_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            dir,
            base_name,
            stem,
            extension,
            opts,
        })
    }

    /// Directory the base file lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the active (index 0, no token) file.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Whether rotated names carry a numeric index.
    pub fn needs_index(&self) -> bool {
        self.opts.needs_index
    }

    /// Builds the file name for the given rotation index and date token.
    ///
    /// The date part appears when a token exists and `index > 0` or
    /// `always_include_date` is set. The index part appears for
    /// `index > 0`, except that a date-carrying name may drop an index of
    /// 1 when indices are not needed: the first generation of a period is
    /// the bare dated name, and later generations of the same period get
    /// the index back so they never collide with it.
    pub fn format(&self, index: u64, date_token: Option<&str>) -> PathBuf {
        let mut parts: Vec<&str> = Vec::with_capacity(2);
        if let Some(token) = date_token {
            if index > 0 || self.opts.always_include_date {
                parts.push(token);
            }
        }
        let index_text = index.to_string();
        if index > 0 && (self.opts.needs_index || date_token.is_none() || index > 1) {
            parts.push(&index_text);
        }

        let mut name = if self.opts.keep_file_ext {
            let mut name = self.stem.clone();
            for part in &parts {
                name.push_str(&self.opts.sep);
                name.push_str(part);
            }
            if !self.extension.is_empty() {
                name.push('.');
                name.push_str(&self.extension);
            }
            name
        } else {
            let mut name = self.base_name.clone();
            for part in &parts {
                name.push_str(&self.opts.sep);
                name.push_str(part);
            }
            name
        };
        // Degenerate but possible: all parts suppressed.
        if name.is_empty() {
            name = self.base_name.clone();
        }

        self.dir.join(name)
    }

    /// Parses a file name back into its rotation components; `None` when
    /// the name is not a generation of this base file.
    pub fn parse(&self, file_name: &str) -> Option<BackupFile> {
        let mut name = file_name;
        let mut compressed = false;
        if let Some(stripped) = name.strip_suffix(".gz") {
            name = stripped;
            compressed = true;
        }

        let middle = if self.opts.keep_file_ext {
            let name = if self.extension.is_empty() {
                name
            } else {
                name.strip_suffix(&self.extension)?.strip_suffix('.')?
            };
            if name == self.stem {
                ""
            } else {
                name.strip_prefix(&self.stem)?.strip_prefix(&self.opts.sep)?
            }
        } else if name == self.base_name {
            ""
        } else {
            name.strip_prefix(&self.base_name)?
                .strip_prefix(&self.opts.sep)?
        };

        let (index, date_token) = self.interpret(middle)?;
        Some(BackupFile {
            path: self.dir.join(file_name),
            index,
            date_token,
            compressed,
        })
    }

    /// Lists all rotated generations of the base file in its directory.
    /// The active file itself is excluded.
    pub fn scan(&self) -> io::Result<Vec<BackupFile>> {
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == self.base_name {
                continue;
            }
            if let Some(backup) = self.parse(name) {
                backups.push(backup);
            }
        }
        Ok(backups)
    }

    /// Next index for a rotation under `date_token`: one past the highest
    /// index among existing generations of the same period.
    ///
    /// A bare dated name parses with index 0 but is the first generation
    /// of its period, so it counts as index 1 here. This is what keeps a
    /// second rotation within one period from formatting the same target
    /// and overwriting it.
    pub fn next_index(&self, date_token: Option<&str>) -> io::Result<u64> {
        let max = self
            .scan()?
            .into_iter()
            .filter(|backup| backup.date_token.as_deref() == date_token)
            .map(|backup| backup.index.max(1))
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    fn interpret(&self, middle: &str) -> Option<(u64, Option<String>)> {
        if middle.is_empty() {
            return Some((0, None));
        }

        if let Some(pattern) = &self.opts.date_pattern {
            if matches_pattern(middle, pattern) {
                return Some((0, Some(middle.to_string())));
            }
            // Date tokens may themselves contain the separator, so split
            // at the last occurrence only.
            if let Some(pos) = middle.rfind(&self.opts.sep) {
                let date_part = &middle[..pos];
                let index_part = &middle[pos + self.opts.sep.len()..];
                if is_index(index_part) && matches_pattern(date_part, pattern) {
                    return Some((index_part.parse().ok()?, Some(date_part.to_string())));
                }
            }
        }

        if is_index(middle) {
            return Some((middle.parse().ok()?, None));
        }
        None
    }
}

fn is_index(text: &str) -> bool {
    !text.is_empty() && text.len() <= 19 && text.bytes().all(|b| b.is_ascii_digit())
}

fn matches_pattern(text: &str, pattern: &str) -> bool {
    let mut parsed = Parsed::new();
    chrono_parse(&mut parsed, text, StrftimeItems::new(pattern)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(keep_file_ext: bool, date_pattern: Option<&str>) -> FileNamePattern {
        FileNamePattern::new(
            Path::new("/var/log/app.log"),
            FileNameOptions {
                keep_file_ext,
                date_pattern: date_pattern.map(str::to_string),
                ..FileNameOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_format_appends_after_extension() {
        let p = pattern(false, Some("%Y-%m-%d"));
        assert_eq!(
            p.format(2, Some("2024-05-01")),
            Path::new("/var/log/app.log.2024-05-01.2")
        );
        assert_eq!(p.format(3, None), Path::new("/var/log/app.log.3"));
        assert_eq!(p.format(0, None), Path::new("/var/log/app.log"));
    }

    #[test]
    fn test_format_keeps_extension_last() {
        let p = pattern(true, Some("%Y-%m-%d"));
        assert_eq!(
            p.format(2, Some("2024-05-01")),
            Path::new("/var/log/app.2024-05-01.2.log")
        );
        assert_eq!(p.format(1, None), Path::new("/var/log/app.1.log"));
        assert_eq!(p.format(0, None), Path::new("/var/log/app.log"));
    }

    #[test]
    fn test_date_token_omitted_for_index_zero() {
        let p = pattern(false, Some("%Y-%m-%d"));
        assert_eq!(p.format(0, Some("2024-05-01")), Path::new("/var/log/app.log"));

        let always = FileNamePattern::new(
            Path::new("/var/log/app.log"),
            FileNameOptions {
                always_include_date: true,
                date_pattern: Some("%Y-%m-%d".to_string()),
                ..FileNameOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            always.format(0, Some("2024-05-01")),
            Path::new("/var/log/app.log.2024-05-01")
        );
    }

    #[test]
    fn test_index_suppressed_without_needs_index() {
        let p = FileNamePattern::new(
            Path::new("app.log"),
            FileNameOptions {
                needs_index: false,
                date_pattern: Some("%Y-%m-%d".to_string()),
                ..FileNameOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            p.format(1, Some("2024-05-01")),
            Path::new("./app.log.2024-05-01")
        );
        // Later generations of the same period get the index back.
        assert_eq!(
            p.format(2, Some("2024-05-01")),
            Path::new("./app.log.2024-05-01.2")
        );
        // Without a token the index is still needed to tell files apart.
        assert_eq!(p.format(1, None), Path::new("./app.log.1"));
    }

    #[test]
    fn test_next_index_counts_bare_dated_name_as_first_generation() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let base = temp_dir.path().join("app.log");
        fs::write(temp_dir.path().join("app.log.2024-05-01"), b"").unwrap();

        let p = FileNamePattern::new(
            &base,
            FileNameOptions {
                needs_index: false,
                date_pattern: Some("%Y-%m-%d".to_string()),
                ..FileNameOptions::default()
            },
        )
        .unwrap();

        assert_eq!(p.next_index(Some("2024-05-01")).unwrap(), 2);
        assert_eq!(
            p.format(2, Some("2024-05-01")),
            base.parent().unwrap().join("app.log.2024-05-01.2")
        );
        // A fresh period starts over at the bare dated name.
        assert_eq!(p.next_index(Some("2024-05-02")).unwrap(), 1);
        assert_eq!(
            p.format(1, Some("2024-05-02")),
            base.parent().unwrap().join("app.log.2024-05-02")
        );
    }

    #[test]
    fn test_parse_round_trip() {
        for keep in [false, true] {
            let p = pattern(keep, Some("%Y-%m-%d"));
            for (index, token) in [
                (0, None),
                (1, None),
                (7, None),
                (1, Some("2024-05-01")),
                (12, Some("2024-12-31")),
            ] {
                let path = p.format(index, token);
                let name = path.file_name().unwrap().to_str().unwrap();
                let parsed = p.parse(name).unwrap();
                assert_eq!(parsed.index, index, "name {name}");
                assert_eq!(parsed.date_token.as_deref(), token, "name {name}");
                assert!(!parsed.compressed);
            }
        }
    }

    #[test]
    fn test_parse_gz_suffix() {
        let p = pattern(false, None);
        let parsed = p.parse("app.log.3.gz").unwrap();
        assert_eq!(parsed.index, 3);
        assert!(parsed.compressed);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        let p = pattern(false, Some("%Y-%m-%d"));
        assert!(p.parse("other.log.1").is_none());
        assert!(p.parse("app.log.notes").is_none());
        assert!(p.parse("app.log.2024-13-40").is_none());
        assert!(p.parse("app.txt").is_none());
    }

    #[test]
    fn test_parse_token_containing_separator() {
        let p = FileNamePattern::new(
            Path::new("app.log"),
            FileNameOptions {
                date_pattern: Some("%Y.%m.%d".to_string()),
                ..FileNameOptions::default()
            },
        )
        .unwrap();
        let parsed = p.parse("app.log.2024.05.01.2").unwrap();
        assert_eq!(parsed.index, 2);
        assert_eq!(parsed.date_token.as_deref(), Some("2024.05.01"));
    }

    #[test]
    fn test_custom_separator() {
        let p = FileNamePattern::new(
            Path::new("app.log"),
            FileNameOptions {
                sep: "_".to_string(),
                ..FileNameOptions::default()
            },
        )
        .unwrap();
        assert_eq!(p.format(4, None), Path::new("./app.log_4"));
        assert_eq!(p.parse("app.log_4").unwrap().index, 4);
        assert!(p.parse("app.log.4").is_none());
    }

    #[test]
    fn test_scan_and_next_index() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let base = temp_dir.path().join("app.log");
        fs::write(&base, b"active").unwrap();
        fs::write(temp_dir.path().join("app.log.1"), b"").unwrap();
        fs::write(temp_dir.path().join("app.log.2.gz"), b"").unwrap();
        fs::write(temp_dir.path().join("unrelated.txt"), b"").unwrap();

        let p = FileNamePattern::new(&base, FileNameOptions::default()).unwrap();
        let mut backups = p.scan().unwrap();
        backups.sort_by_key(|backup| backup.index);

        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].index, 1);
        assert_eq!(backups[1].index, 2);
        assert!(backups[1].compressed);
        assert_eq!(p.next_index(None).unwrap(), 3);
    }

    #[test]
    fn test_rejects_empty_separator() {
        let result = FileNamePattern::new(
            Path::new("app.log"),
            FileNameOptions {
                sep: String::new(),
                ..FileNameOptions::default()
            },
        );
        assert!(result.is_err());
    }
}
