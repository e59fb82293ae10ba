//! # recordq testkit
//!
//! Test utilities for the recordq durable queue.
//!
//! This crate provides:
//! - Temporary queue directories with test-friendly options
//! - Recording and gated upload sessions
//! - Helpers that damage segment files the way a crash would
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recordq_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn writes_are_uploaded() {
//!     let dir = TestDir::new();
//!     let log = UploadLog::new();
//!     let queue = dir.open(&log).await;
//!     queue.write(b"x").await.unwrap();
//!     queue.flush().await.unwrap();
//!     assert_eq!(log.payloads(), vec![b"x".to_vec()]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod uploaders;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::uploaders::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use uploaders::*;
