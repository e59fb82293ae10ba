//! # recordq core
//!
//! A durable on-disk record queue for buffering locally produced records
//! until they are uploaded.
//!
//! This crate provides:
//! - Framing: each record is written with its sequence number, size, and
//!   CRC32 hash, padded with random bytes to a 16-byte boundary
//! - Segments: records go into size-bounded files named by their first
//!   sequence number
//! - Crash recovery: on open the tail segment is replayed and cut back to
//!   its last verified frame
//! - Uploads: records are walked in order and handed to an
//!   [`UploadSession`], periodically or after every write
//! - Retention: confirmed records are dropped a whole segment at a time,
//!   never while a read is using them
//!
//! ## Example
//!
//! ```rust,ignore
//! use recordq_core::{QueueOptions, StorageQueue};
//!
//! let queue = StorageQueue::open(QueueOptions::new("/var/lib/reports"), factory).await?;
//! let seq = queue.write(b"payload").await?;
//! queue.flush().await?;
//! queue.confirm(seq).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
pub mod frame;
mod queue;
mod segment;
mod types;
mod upload;

pub use config::QueueOptions;
pub use error::{ErrorKind, QueueError, QueueResult};
pub use queue::StorageQueue;
pub use types::{QueueStats, SequenceNumber};
pub use upload::{BoxFuture, Record, UploadSession, UploadSessionFactory};
