//! Test fixtures and queue helpers.
//!
//! Provides a temporary queue directory that outlives queue instances, so
//! tests can close a queue and open it again on the same files.

use crate::uploaders::UploadLog;
use recordq_core::{QueueOptions, StorageQueue, UploadSessionFactory};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// File prefix used by [`TestDir::options`].
pub const TEST_PREFIX: &str = "test";

/// Payload size that makes each frame exactly 32 bytes.
pub const SMALL_PAYLOAD: usize = 16;

/// A temporary queue directory with automatic cleanup.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns options for this directory.
    ///
    /// Uploads are only explicit (the timer period is an hour) and writes
    /// skip fsync, which keeps tests fast.
    pub fn options(&self) -> QueueOptions {
        QueueOptions::new(self.path())
            .file_prefix(TEST_PREFIX)
            .upload_period(Duration::from_secs(3600))
            .sync_on_write(false)
    }

    /// Returns options whose segments hold `frames` frames of
    /// [`SMALL_PAYLOAD`] bytes each.
    pub fn options_with_frames_per_segment(&self, frames: u64) -> QueueOptions {
        self.options().single_file_max_size(frames * 32)
    }

    /// Opens a queue with [`TestDir::options`] uploading into `log`.
    pub async fn open(&self, log: &UploadLog) -> StorageQueue {
        self.open_with(self.options(), log.factory()).await
    }

    /// Opens a queue with the given options and factory.
    pub async fn open_with<F>(&self, options: QueueOptions, factory: F) -> StorageQueue
    where
        F: UploadSessionFactory + 'static,
    {
        StorageQueue::open(options, factory)
            .await
            .expect("Failed to open queue")
    }

    /// Returns the path of the segment starting at `key`.
    pub fn segment_path(&self, key: u64) -> PathBuf {
        self.path().join(format!("{TEST_PREFIX}.{key}"))
    }

    /// Returns the keys of all segment files, ascending.
    pub fn segment_keys(&self) -> Vec<u64> {
        let marker = format!("{TEST_PREFIX}.");
        let mut keys: Vec<u64> = fs::read_dir(self.path())
            .expect("Failed to list queue directory")
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().into_string().ok()?;
                name.strip_prefix(&marker)?.parse().ok()
            })
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a payload of [`SMALL_PAYLOAD`] bytes tagged with `tag`.
pub fn small_payload(tag: u8) -> Vec<u8> {
    vec![tag; SMALL_PAYLOAD]
}

/// Writes `count` [`small_payload`]s tagged 0, 1, 2, ...
pub async fn write_small(queue: &StorageQueue, count: u8) {
    for tag in 0..count {
        queue
            .write(&small_payload(tag))
            .await
            .expect("Failed to write record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reopen_on_same_directory() {
        let dir = TestDir::new();
        let log = UploadLog::new();

        let queue = dir.open(&log).await;
        write_small(&queue, 3).await;
        queue.close().await.unwrap();

        let queue = dir.open(&log).await;
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.next_seq_number.as_u64(), 3);
        assert_eq!(dir.segment_keys(), vec![0]);
    }

    #[test]
    fn small_payloads_fill_one_frame() {
        let payload = small_payload(7);
        assert_eq!(
            recordq_core::frame::frame_size(payload.len()),
            32,
            "16-byte header + 16-byte payload"
        );
    }
}
