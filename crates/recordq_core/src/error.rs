//! Error types for queue operations.

use recordq_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Classification of every queue error.
///
/// Callers branch on the kind rather than on individual variants; wrapped
/// storage errors are classified too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Directory missing or locked, or the queue is closed.
    Unavailable,
    /// Duplicate segment key.
    AlreadyExists,
    /// Record too large, or sequence number not retained.
    OutOfRange,
    /// Write failure or over-large read request.
    ResourceExhausted,
    /// Frame corruption.
    DataLoss,
    /// Invariant violation.
    Internal,
}

/// Errors that can occur in queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Segment file error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Directory-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The queue directory or the queue itself cannot be used.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Description of the condition.
        message: String,
    },

    /// A segment key is already taken.
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Description of the collision.
        message: String,
    },

    /// A size or sequence number is outside what the queue can serve.
    #[error("out of range: {message}")]
    OutOfRange {
        /// Description of the range violation.
        message: String,
    },

    /// A write could not be completed.
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Description of the failure.
        message: String,
    },

    /// A frame failed validation.
    #[error("data loss in {file}: {message}")]
    DataLoss {
        /// Segment file containing the bad frame.
        file: String,
        /// Description of the corruption.
        message: String,
    },

    /// An internal invariant does not hold.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violation.
        message: String,
    },
}

impl QueueError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Creates an out-of-range error.
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    /// Creates a resource-exhausted error.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Creates a data-loss error naming the offending file.
    pub fn data_loss(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataLoss {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(err) => match err {
                StorageError::Io(_) | StorageError::ReadTooLarge { .. } => {
                    ErrorKind::ResourceExhausted
                }
                StorageError::ReadPastEnd { .. } => ErrorKind::OutOfRange,
                StorageError::Closed(_) => ErrorKind::Unavailable,
                StorageError::ReadOnly(_) | StorageError::StillOpen(_) => ErrorKind::Internal,
            },
            Self::Io(_) => ErrorKind::ResourceExhausted,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::DataLoss { .. } => ErrorKind::DataLoss,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_of_constructed_errors() {
        assert_eq!(QueueError::unavailable("x").kind(), ErrorKind::Unavailable);
        assert_eq!(QueueError::already_exists("x").kind(), ErrorKind::AlreadyExists);
        assert_eq!(QueueError::out_of_range("x").kind(), ErrorKind::OutOfRange);
        assert_eq!(
            QueueError::resource_exhausted("x").kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(QueueError::data_loss("q.0", "x").kind(), ErrorKind::DataLoss);
        assert_eq!(QueueError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn kinds_of_storage_errors() {
        let io_err: QueueError = StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk")).into();
        assert_eq!(io_err.kind(), ErrorKind::ResourceExhausted);

        let too_large: QueueError = StorageError::ReadTooLarge {
            requested: 2,
            capacity: 1,
        }
        .into();
        assert_eq!(too_large.kind(), ErrorKind::ResourceExhausted);

        let closed: QueueError = StorageError::Closed("q.0".into()).into();
        assert_eq!(closed.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn data_loss_names_file() {
        let err = QueueError::data_loss("queue.7", "hash mismatch");
        assert_eq!(err.to_string(), "data loss in queue.7: hash mismatch");
    }
}
