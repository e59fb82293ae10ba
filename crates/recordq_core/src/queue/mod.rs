//! The durable record queue.
//!
//! [`StorageQueue`] is a cheap-to-clone handle. Each call posts a command to
//! the queue's worker thread and awaits the reply, so no call blocks the
//! caller's thread and all state changes happen in arrival order.
//!
//! ```rust,ignore
//! let queue = StorageQueue::open(QueueOptions::new(dir), factory).await?;
//! let seq = queue.write(b"report").await?;
//! queue.flush().await?;
//! queue.confirm(seq).await?;
//! queue.close().await?;
//! ```

mod read;
mod worker;

use crate::config::QueueOptions;
use crate::error::{QueueError, QueueResult};
use crate::types::{QueueStats, SequenceNumber};
use crate::upload::{UploadSession, UploadSessionFactory};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use worker::{Command, ReadId, Reply};

/// Sending side of the worker's command channel.
#[derive(Clone)]
pub(crate) struct Mailbox {
    sender: mpsc::UnboundedSender<Command>,
    read_ids: Arc<AtomicU64>,
}

impl Mailbox {
    fn new(sender: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            sender,
            read_ids: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_read_id(&self) -> ReadId {
        ReadId(self.read_ids.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, command: Command) -> QueueResult<()> {
        self.sender.send(command).map_err(|_| closed())
    }

    /// Posts a command and waits for its reply.
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> QueueResult<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply))?;
        response.await.map_err(|_| closed())?
    }
}

fn closed() -> QueueError {
    QueueError::unavailable("queue is closed")
}

/// A durable, append-only queue of opaque records.
///
/// Records are framed into segment files in one directory and survive
/// process restarts. Uploads walk the records in sequence order; confirming
/// a sequence number lets the queue delete the segments it covers.
///
/// Cloned handles share one queue. Dropping the last handle stops the upload
/// timer and closes the queue without waiting for in-flight uploads; use
/// [`close`](Self::close) to wait for the files and the directory lock to
/// be released.
#[derive(Clone)]
pub struct StorageQueue {
    inner: Arc<Inner>,
}

struct Inner {
    mailbox: Mailbox,
    factory: Arc<dyn UploadSessionFactory>,
    options: QueueOptions,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
        let (reply, _) = oneshot::channel();
        let _ = self.mailbox.send(Command::Shutdown { reply });
    }
}

impl StorageQueue {
    /// Opens the queue in `options.directory`, recovering any records left
    /// by a previous run.
    ///
    /// An unverifiable tail left by a crash is truncated, not reported. When
    /// `options.upload_period` is non-zero a periodic upload starts, using a
    /// fresh session from `factory` on each tick.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - Internal error for invalid options or an unexpected file in the
    ///   directory
    /// - Unavailable if the directory is missing (and may not be created) or
    ///   locked by another owner
    /// - Already-exists if two files claim the same segment key
    pub async fn open<F>(options: QueueOptions, factory: F) -> QueueResult<Self>
    where
        F: UploadSessionFactory + 'static,
    {
        options.validate()?;

        let (sender, commands) = mpsc::unbounded_channel();
        let (ready, opened) = oneshot::channel();
        // Detached: the thread ends once every mailbox is gone.
        let _worker = worker::spawn(options.clone(), commands, ready)?;
        opened
            .await
            .map_err(|_| QueueError::internal("queue worker exited while opening"))??;

        let mailbox = Mailbox::new(sender);
        let factory: Arc<dyn UploadSessionFactory> = Arc::new(factory);
        let timer = if options.uploads_immediately() {
            None
        } else {
            Some(spawn_timer(
                mailbox.clone(),
                Arc::clone(&factory),
                options.upload_period,
            ))
        };

        Ok(Self {
            inner: Arc::new(Inner {
                mailbox,
                factory,
                options,
                timer: Mutex::new(timer),
            }),
        })
    }

    /// Durably appends one record and returns its sequence number.
    ///
    /// Empty records are allowed. When the queue uploads immediately, an
    /// upload is started in the background after the write; failing to get
    /// a session for it is logged and does not fail the write.
    ///
    /// # Errors
    ///
    /// - Out-of-range if the framed record exceeds the total queue budget
    /// - Resource-exhausted if the disk write fails
    /// - Already-exists if segment bookkeeping collides with an existing file
    /// - Unavailable if the queue is closed
    pub async fn write(&self, record: &[u8]) -> QueueResult<SequenceNumber> {
        let payload = record.to_vec();
        let sequence = self
            .inner
            .mailbox
            .request(|reply| Command::Write { payload, reply })
            .await?;

        if self.inner.options.uploads_immediately() {
            let mailbox = self.inner.mailbox.clone();
            let factory = Arc::clone(&self.inner.factory);
            tokio::spawn(async move {
                upload_with_new_session(&mailbox, factory.as_ref()).await;
            });
        }
        Ok(sequence)
    }

    /// Uploads everything from the first retained record using a fresh
    /// session from the queue's factory.
    ///
    /// Records still in the current segment are included: the segment is
    /// closed and a new one started first.
    ///
    /// # Errors
    ///
    /// - Whatever the factory returns when it cannot create a session
    /// - Out-of-range if there is nothing to upload
    /// - Data loss if a frame fails validation (also passed to the session)
    pub async fn flush(&self) -> QueueResult<()> {
        let session = self.inner.factory.new_session()?;
        read::run_upload(&self.inner.mailbox, None, session).await
    }

    /// Walks the records from `start` onward with the given session.
    ///
    /// # Errors
    ///
    /// - Out-of-range if `start` is no longer retained or not written yet
    /// - Data loss if a frame fails validation (also passed to the session)
    pub async fn read_from(
        &self,
        start: SequenceNumber,
        session: Box<dyn UploadSession>,
    ) -> QueueResult<()> {
        read::run_upload(&self.inner.mailbox, Some(start), session).await
    }

    /// Marks every record up to and including `sequence` as delivered.
    ///
    /// Segments holding only delivered records are deleted, after any read
    /// in flight finishes. Confirming a sequence number that was never
    /// written is a no-op, and the retained range never moves back.
    ///
    /// # Errors
    ///
    /// Returns unavailable if the queue is closed. Deletion failures are
    /// logged and retried on the next confirm.
    pub async fn confirm(&self, sequence: SequenceNumber) -> QueueResult<()> {
        self.inner
            .mailbox
            .request(|reply| Command::Confirm { sequence, reply })
            .await
    }

    /// Returns a snapshot of the queue's bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns unavailable if the queue is closed.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        self.inner
            .mailbox
            .request(|reply| Command::Stats { reply })
            .await
    }

    /// Returns the options the queue was opened with.
    #[must_use]
    pub fn options(&self) -> &QueueOptions {
        &self.inner.options
    }

    /// Stops the upload timer, closes every segment, and releases the
    /// directory lock.
    ///
    /// Later calls on any handle fail with unavailable. Closing twice is
    /// fine. In-flight uploads end with an unavailable error.
    ///
    /// # Errors
    ///
    /// Currently always succeeds.
    pub async fn close(&self) -> QueueResult<()> {
        let timer = self.inner.timer.lock().take();
        if let Some(timer) = timer {
            timer.abort();
        }

        let (reply, done) = oneshot::channel();
        if self.inner.mailbox.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StorageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageQueue")
            .field("directory", &self.inner.options.directory)
            .field("file_prefix", &self.inner.options.file_prefix)
            .finish_non_exhaustive()
    }
}

fn spawn_timer(
    mailbox: Mailbox,
    factory: Arc<dyn UploadSessionFactory>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if mailbox.sender.is_closed() {
                break;
            }
            upload_with_new_session(&mailbox, factory.as_ref()).await;
        }
        debug!("upload timer stopped");
    })
}

/// Runs one background upload; its outcome only goes to the session.
async fn upload_with_new_session(mailbox: &Mailbox, factory: &dyn UploadSessionFactory) {
    let session = match factory.new_session() {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "skipping upload: no session available");
            return;
        }
    };
    let _ = read::run_upload(mailbox, None, session).await;
}
