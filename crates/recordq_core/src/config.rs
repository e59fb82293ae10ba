//! Queue configuration.

use crate::error::{QueueError, QueueResult};
use crate::frame::HEADER_SIZE;
use recordq_storage::DEFAULT_READ_BUFFER_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Options for opening a queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Directory holding the queue's segment files.
    pub directory: PathBuf,

    /// Segment files are named `<file_prefix>.<first sequence number>`.
    pub file_prefix: String,

    /// A segment is rolled over before it would grow past this size.
    pub single_file_max_size: u64,

    /// Records whose frame exceeds this size are rejected.
    pub total_queue_max_size: u64,

    /// Interval between periodic uploads (zero = upload after every write).
    pub upload_period: Duration,

    /// Capacity of each segment's read buffer.
    pub read_buffer_size: usize,

    /// Whether to fsync the segment after every appended frame.
    pub sync_on_write: bool,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            file_prefix: "queue".to_string(),
            single_file_max_size: 2 * 1024 * 1024,  // 2 MB
            total_queue_max_size: 64 * 1024 * 1024, // 64 MB
            upload_period: Duration::from_secs(1),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            sync_on_write: true,
            create_if_missing: true,
        }
    }
}

impl QueueOptions {
    /// Creates options for a queue in `directory` with default values.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Sets the segment file name prefix.
    #[must_use]
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Sets the maximum size of a single segment file.
    #[must_use]
    pub const fn single_file_max_size(mut self, size: u64) -> Self {
        self.single_file_max_size = size;
        self
    }

    /// Sets the total queue size budget.
    #[must_use]
    pub const fn total_queue_max_size(mut self, size: u64) -> Self {
        self.total_queue_max_size = size;
        self
    }

    /// Sets the periodic upload interval.
    #[must_use]
    pub const fn upload_period(mut self, period: Duration) -> Self {
        self.upload_period = period;
        self
    }

    /// Uploads right after every write instead of on a timer.
    #[must_use]
    pub const fn upload_immediately(mut self) -> Self {
        self.upload_period = Duration::ZERO;
        self
    }

    /// Sets the read buffer capacity.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets whether to fsync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Returns true if uploads run after every write.
    #[must_use]
    pub fn uploads_immediately(&self) -> bool {
        self.upload_period.is_zero()
    }

    /// Checks that the options describe a usable queue.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an empty or path-like prefix, a zero
    /// segment or queue size, or a read buffer smaller than a frame header.
    pub fn validate(&self) -> QueueResult<()> {
        if self.file_prefix.is_empty() {
            return Err(QueueError::internal("file prefix must not be empty"));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(QueueError::internal(format!(
                "file prefix must be a plain file name: {}",
                self.file_prefix
            )));
        }
        if self.single_file_max_size == 0 {
            return Err(QueueError::internal("single file max size must be non-zero"));
        }
        if self.total_queue_max_size == 0 {
            return Err(QueueError::internal("total queue max size must be non-zero"));
        }
        if self.read_buffer_size < HEADER_SIZE {
            return Err(QueueError::internal(format!(
                "read buffer size must hold at least one frame header ({HEADER_SIZE} bytes)"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_options() {
        let options = QueueOptions::default();
        assert_eq!(options.file_prefix, "queue");
        assert!(options.sync_on_write);
        assert!(options.create_if_missing);
        assert!(!options.uploads_immediately());
    }

    #[test]
    fn builder_pattern() {
        let options = QueueOptions::new("/tmp/q")
            .file_prefix("reports")
            .single_file_max_size(1024)
            .total_queue_max_size(4096)
            .upload_immediately()
            .sync_on_write(false);

        assert_eq!(options.directory, PathBuf::from("/tmp/q"));
        assert_eq!(options.file_prefix, "reports");
        assert_eq!(options.single_file_max_size, 1024);
        assert_eq!(options.total_queue_max_size, 4096);
        assert!(options.uploads_immediately());
        assert!(!options.sync_on_write);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_prefix() {
        let empty = QueueOptions::new("/tmp/q").file_prefix("");
        assert_eq!(empty.validate().unwrap_err().kind(), ErrorKind::Internal);

        let nested = QueueOptions::new("/tmp/q").file_prefix("a/b");
        assert_eq!(nested.validate().unwrap_err().kind(), ErrorKind::Internal);
    }

    #[test]
    fn validate_rejects_undersized_limits() {
        let options = QueueOptions::new("/tmp/q").single_file_max_size(0);
        assert!(options.validate().is_err());

        let options = QueueOptions::new("/tmp/q").total_queue_max_size(0);
        assert_eq!(options.validate().unwrap_err().kind(), ErrorKind::Internal);

        let options = QueueOptions::new("/tmp/q").read_buffer_size(8);
        assert!(options.validate().is_err());
    }
}
