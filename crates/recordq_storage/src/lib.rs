//! # recordq storage
//!
//! Single-segment file handles for the recordq durable queue.
//!
//! This crate provides the lowest-level storage abstraction: one
//! [`SingleFile`] per on-disk segment. Segments are **opaque byte runs** -
//! this crate knows nothing about frames, hashes, or sequence numbers.
//!
//! ## Design Principles
//!
//! - Writes only ever append at the tracked end of file
//! - Reads are sequential and served from one bounded, reusable buffer
//! - Reading at the end of the file is a distinguished outcome
//!   ([`StorageError::ReadPastEnd`]), not a generic failure
//! - Handles are owned by a single thread; there is no internal locking
//!
//! ## Example
//!
//! ```no_run
//! use recordq_storage::SingleFile;
//! use std::path::Path;
//!
//! let mut file = SingleFile::new(Path::new("queue.0"), 0);
//! file.open(false).unwrap();
//! file.append(b"hello world").unwrap();
//! let data = file.read(0, 5).unwrap();
//! assert_eq!(data, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;

pub use error::{StorageError, StorageResult};
pub use file::{SingleFile, DEFAULT_READ_BUFFER_SIZE};
