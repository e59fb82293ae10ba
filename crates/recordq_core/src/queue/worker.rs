//! The queue's serialized execution context.
//!
//! Every operation that touches segment state runs on one dedicated thread,
//! in the order its command arrived. The worker owns the [`FileSet`] and the
//! open read cursors outright, so no locks guard them.

use crate::config::QueueOptions;
use crate::dir::QueueDir;
use crate::error::{QueueError, QueueResult};
use crate::frame::encode_frame;
use crate::segment::{FileSet, ReadCursor};
use crate::types::{QueueStats, SequenceNumber};
use crate::upload::Record;
use recordq_storage::StorageError;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Identifies one in-flight read walk. Allocated by the caller, so the walk
/// can be unregistered even before the worker has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ReadId(pub(crate) u64);

pub(crate) type Reply<T> = oneshot::Sender<QueueResult<T>>;

/// A request for the worker thread.
pub(crate) enum Command {
    Write {
        payload: Vec<u8>,
        reply: Reply<SequenceNumber>,
    },
    /// Makes the current segment readable and opens a cursor. `None` starts
    /// at the first retained record.
    StartRead {
        id: ReadId,
        start: Option<SequenceNumber>,
        reply: Reply<()>,
    },
    ReadNext {
        id: ReadId,
        reply: Reply<Option<Record>>,
    },
    EndRead {
        id: ReadId,
    },
    Confirm {
        sequence: SequenceNumber,
        reply: Reply<()>,
    },
    Stats {
        reply: Reply<QueueStats>,
    },
    /// Closes every file and releases the directory lock before replying.
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Spawns the worker thread.
///
/// The worker opens the queue directory itself and reports the outcome on
/// `ready` before serving any command.
pub(crate) fn spawn(
    options: QueueOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<QueueResult<()>>,
) -> QueueResult<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("recordq-{}", options.file_prefix))
        .spawn(move || match QueueState::open(&options) {
            Ok(state) => {
                if ready.send(Ok(())).is_ok() {
                    worker_loop(state, commands);
                }
            }
            Err(e) => {
                let _ = ready.send(Err(e));
            }
        })
        .map_err(|e| QueueError::unavailable(format!("cannot spawn queue worker: {e}")))
}

fn worker_loop(state: QueueState, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut state = Some(state);

    while let Some(command) = commands.blocking_recv() {
        let Some(current) = state.as_mut() else {
            // Closed: drop the command, which fails its reply channel.
            if let Command::Shutdown { reply } = command {
                let _ = reply.send(());
            }
            continue;
        };

        match command {
            Command::Write { payload, reply } => {
                let _ = reply.send(current.write(&payload));
            }
            Command::StartRead { id, start, reply } => {
                let _ = reply.send(current.start_read(id, start));
            }
            Command::ReadNext { id, reply } => {
                let _ = reply.send(current.read_next(id));
            }
            Command::EndRead { id } => current.end_read(id),
            Command::Confirm { sequence, reply } => {
                current.confirm(sequence);
                let _ = reply.send(Ok(()));
            }
            Command::Stats { reply } => {
                let _ = reply.send(Ok(current.stats()));
            }
            Command::Shutdown { reply } => {
                if let Some(mut closing) = state.take() {
                    closing.close();
                }
                let _ = reply.send(());
            }
        }
    }

    if let Some(mut closing) = state.take() {
        closing.close();
    }
    debug!("queue worker stopped");
}

/// Everything the worker owns.
struct QueueState {
    files: FileSet,
    reads: HashMap<ReadId, ReadCursor>,
    sync_on_write: bool,
}

impl QueueState {
    fn open(options: &QueueOptions) -> QueueResult<Self> {
        let dir = QueueDir::open(
            &options.directory,
            &options.file_prefix,
            options.create_if_missing,
        )?;
        let mut files = FileSet::enumerate(dir, options)?;
        files.scan_tail()?;

        info!(
            directory = %files.directory().display(),
            segments = files.segment_count(),
            first = files.first_seq().as_u64(),
            next = files.next_seq().as_u64(),
            "opened queue"
        );

        Ok(Self {
            files,
            reads: HashMap::new(),
            sync_on_write: options.sync_on_write,
        })
    }

    fn write(&mut self, payload: &[u8]) -> QueueResult<SequenceNumber> {
        let sequence = self.files.next_seq();
        let frame = encode_frame(sequence, payload)?;
        let sync_on_write = self.sync_on_write;
        let file = self.files.assign_writable(frame.len() as u64)?;
        let offset_before = file.size();

        let appended = match file.append(&frame) {
            Ok(offset) if sync_on_write => file.sync().map_err(|e| {
                // Never leave an unacknowledged frame as the tail.
                if let Err(rollback) = file.truncate(offset) {
                    warn!(
                        file = %file.name(),
                        error = %rollback,
                        "failed to drop unsynced record"
                    );
                }
                e
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = appended {
            let name = file.name();
            let left_behind = file.size() > offset_before;
            warn!(file = %name, error = %e, "failed to append record");
            if left_behind {
                // The frame is still tracked; the next record must not reuse
                // its sequence number.
                self.files.advance_next_seq();
            }
            return Err(match e {
                StorageError::Io(io) => {
                    QueueError::resource_exhausted(format!("write to {name} failed: {io}"))
                }
                other => other.into(),
            });
        }

        self.files.advance_next_seq();
        Ok(sequence)
    }

    fn start_read(&mut self, id: ReadId, start: Option<SequenceNumber>) -> QueueResult<()> {
        self.files.switch_if_not_empty()?;
        let start = start.unwrap_or_else(|| self.files.first_seq());
        let cursor = ReadCursor::new(&self.files, start)?;

        self.reads.insert(id, cursor);
        debug!(start = start.as_u64(), active = self.reads.len(), "started read");
        Ok(())
    }

    fn read_next(&mut self, id: ReadId) -> QueueResult<Option<Record>> {
        let cursor = self
            .reads
            .get_mut(&id)
            .ok_or_else(|| QueueError::internal("read walk is not registered"))?;
        cursor.next(&mut self.files)
    }

    fn end_read(&mut self, id: ReadId) {
        if let Some(cursor) = self.reads.remove(&id) {
            cursor.release(&mut self.files);
        }
        if self.reads.is_empty() {
            self.files.run_pending_removal();
        }
    }

    fn confirm(&mut self, sequence: SequenceNumber) {
        self.files.remove_consumed(sequence, self.reads.len());
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            first_seq_number: self.files.first_seq(),
            next_seq_number: self.files.next_seq(),
            segment_count: self.files.segment_count(),
            total_size: self.files.total_size(),
            active_reads: self.reads.len(),
        }
    }

    fn close(&mut self) {
        for (_, cursor) in self.reads.drain() {
            cursor.release(&mut self.files);
        }
        self.files.close_all();
        info!("closed queue");
    }
}
