//! Driving a read walk from the caller's task.

use super::worker::{Command, ReadId};
use super::Mailbox;
use crate::error::{ErrorKind, QueueResult};
use crate::types::SequenceNumber;
use crate::upload::UploadSession;
use tracing::{debug, warn};

/// Unregisters a read walk when dropped, including on early return or when
/// the walking task is cancelled.
struct ReadGuard {
    mailbox: Mailbox,
    id: ReadId,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        // A closed queue has already released every cursor.
        let _ = self.mailbox.send(Command::EndRead { id: self.id });
    }
}

/// Walks the closed segments from `start` (or the first retained record),
/// handing each record to `session`, then reports the outcome to it.
///
/// Each record is fetched only after the previous `process` future
/// resolved, so the worker keeps serving other commands meanwhile.
pub(crate) async fn run_upload(
    mailbox: &Mailbox,
    start: Option<SequenceNumber>,
    mut session: Box<dyn UploadSession>,
) -> QueueResult<()> {
    let status = walk(mailbox, start, session.as_mut()).await;
    match &status {
        // Nothing new to upload.
        Err(e) if e.kind() == ErrorKind::OutOfRange => debug!(error = %e, "upload found no records"),
        Err(e) => warn!(error = %e, "upload walk ended with error"),
        Ok(()) => {}
    }
    session.completed(status.as_ref().map(|_| ()));
    status
}

async fn walk(
    mailbox: &Mailbox,
    start: Option<SequenceNumber>,
    session: &mut dyn UploadSession,
) -> QueueResult<()> {
    // The guard exists before the worker can register the walk, so a future
    // dropped while StartRead is in flight still ends it.
    let id = mailbox.next_read_id();
    let _guard = ReadGuard {
        mailbox: mailbox.clone(),
        id,
    };
    mailbox
        .request(|reply| Command::StartRead { id, start, reply })
        .await?;

    let mut delivered = 0u64;
    while let Some(record) = mailbox
        .request(|reply| Command::ReadNext { id, reply })
        .await?
    {
        let sequence = record.sequence;
        delivered += 1;
        if !session.process(record).await {
            debug!(last = sequence.as_u64(), delivered, "upload stopped early");
            return Ok(());
        }
    }

    debug!(delivered, "upload reached end of closed segments");
    Ok(())
}
