//! Queue directory management.
//!
//! This module handles the file system layout of one queue:
//!
//! ```text
//! <directory>/
//! ├─ LOCK              # Advisory lock for single-owner access
//! ├─ <prefix>.0        # Segment holding records 0..
//! ├─ <prefix>.42       # Segment holding records 42..
//! └─ ...
//! ```
//!
//! Segment files are named by the first sequence number they hold, so a
//! directory listing is enough to rebuild their order.

use crate::error::{QueueError, QueueResult};
use crate::types::SequenceNumber;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// A segment file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SegmentEntry {
    /// First sequence number held by the segment.
    pub key: SequenceNumber,
    /// Path to the segment file.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size: u64,
}

/// Owns a queue directory and holds its lock.
///
/// Only one `QueueDir` can exist per directory at a time, across processes.
#[derive(Debug)]
pub(crate) struct QueueDir {
    path: PathBuf,
    prefix: String,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl QueueDir {
    /// Opens or creates a queue directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an unavailable error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory or cannot be created
    /// - Another owner holds the lock
    pub fn open(path: &Path, prefix: &str, create_if_missing: bool) -> QueueResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(QueueError::unavailable(format!(
                    "queue directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path).map_err(|e| {
                QueueError::unavailable(format!(
                    "cannot create queue directory {}: {e}",
                    path.display()
                ))
            })?;
        }

        if !path.is_dir() {
            return Err(QueueError::unavailable(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                QueueError::unavailable(format!("cannot open {}: {e}", lock_path.display()))
            })?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(QueueError::unavailable(format!(
                "queue directory is locked by another owner: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the queue directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the segment starting at `key`.
    #[must_use]
    pub fn segment_path(&self, key: SequenceNumber) -> PathBuf {
        self.path.join(format!("{}.{}", self.prefix, key.as_u64()))
    }

    /// Lists the segment files in the directory, ordered by key.
    ///
    /// Files not starting with `<prefix>.` are ignored.
    ///
    /// # Errors
    ///
    /// - Internal error if a segment suffix is not a decimal number
    /// - Already-exists error if two files claim the same key
    pub fn list_segments(&self) -> QueueResult<Vec<SegmentEntry>> {
        let marker = format!("{}.", self.prefix);
        let mut found: BTreeMap<SequenceNumber, SegmentEntry> = BTreeMap::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(suffix) = name.strip_prefix(&marker) else {
                continue;
            };

            let key = parse_key(suffix).ok_or_else(|| {
                QueueError::internal(format!("unexpected file in queue directory: {name}"))
            })?;
            let size = entry.metadata()?.len();
            let segment = SegmentEntry {
                key,
                path: entry.path(),
                size,
            };
            if let Some(existing) = found.insert(key, segment) {
                return Err(QueueError::already_exists(format!(
                    "segment {} claimed by both {} and {name}",
                    key.as_u64(),
                    existing.path.display()
                )));
            }
        }

        Ok(found.into_values().collect())
    }

    /// Syncs the directory so segment creation and deletion are durable.
    ///
    /// Windows NTFS journals metadata updates, so this is a no-op there.
    #[cfg(unix)]
    pub fn sync(&self) -> QueueResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn sync(&self) -> QueueResult<()> {
        Ok(())
    }
}

fn parse_key(suffix: &str) -> Option<SequenceNumber> {
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u64>().ok().map(SequenceNumber::new)
}
