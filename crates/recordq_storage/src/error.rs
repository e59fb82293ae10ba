//! Error types for segment file operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during segment file operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No bytes are available at the requested position.
    #[error("read past end of file: offset {offset}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The current file size.
        size: u64,
    },

    /// A single read asked for more bytes than the read buffer holds.
    #[error("read of {requested} bytes exceeds buffer capacity {capacity}")]
    ReadTooLarge {
        /// The requested read length.
        requested: usize,
        /// The read buffer capacity.
        capacity: usize,
    },

    /// Attempted to append through a read-only handle.
    #[error("file is open read-only: {0}")]
    ReadOnly(String),

    /// The file handle is not open.
    #[error("file is closed: {0}")]
    Closed(String),

    /// The file must be closed before it can be deleted.
    #[error("file is still open: {0}")]
    StillOpen(String),
}
