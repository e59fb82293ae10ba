//! Upload session contract.
//!
//! An upload walks the closed segments and hands each record to an
//! [`UploadSession`]. The session decides per record whether the walk goes
//! on, and is told once how the walk ended. Confirming what was delivered is
//! a separate call on the queue.

use crate::error::{QueueError, QueueResult};
use crate::types::SequenceNumber;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A record read back from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Sequence number assigned when the record was written.
    pub sequence: SequenceNumber,
    /// The record's payload.
    pub payload: Bytes,
}

/// Consumer of one read walk.
///
/// Records arrive in sequence order, one at a time: the next record is not
/// read until the future returned by [`process`](UploadSession::process)
/// resolves.
pub trait UploadSession: Send {
    /// Handles one record. Resolve to `false` to stop the walk.
    fn process(&mut self, record: Record) -> BoxFuture<'_, bool>;

    /// Called exactly once when the walk ends.
    ///
    /// `status` is `Ok` when the walk ran out of records or was stopped by
    /// `process`, and carries the error otherwise.
    fn completed(self: Box<Self>, status: Result<(), &QueueError>);
}

/// Creates a fresh session for each periodic or explicit upload.
pub trait UploadSessionFactory: Send + Sync {
    /// Returns a new session.
    ///
    /// # Errors
    ///
    /// Any error skips the upload it was created for.
    fn new_session(&self) -> QueueResult<Box<dyn UploadSession>>;
}

impl<F> UploadSessionFactory for F
where
    F: Fn() -> QueueResult<Box<dyn UploadSession>> + Send + Sync,
{
    fn new_session(&self) -> QueueResult<Box<dyn UploadSession>> {
        self()
    }
}
