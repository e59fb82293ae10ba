//! Upload sessions for tests.
//!
//! Every session here writes into a shared [`UploadLog`], which records each
//! delivered record and each completion status so tests can assert on them
//! after the walk, or wait for them while a background upload runs.

use bytes::Bytes;
use parking_lot::Mutex;
use recordq_core::{
    BoxFuture, ErrorKind, QueueError, QueueResult, Record, SequenceNumber, UploadSession,
    UploadSessionFactory,
};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

#[derive(Default)]
struct LogState {
    records: Vec<Record>,
    completions: Vec<Result<(), ErrorKind>>,
}

/// Shared record of everything upload sessions saw.
#[derive(Clone, Default)]
pub struct UploadLog {
    state: Arc<Mutex<LogState>>,
    changed: Arc<Notify>,
}

impl UploadLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a session that accepts every record.
    #[must_use]
    pub fn session(&self) -> Box<dyn UploadSession> {
        Box::new(RecordingSession {
            log: self.clone(),
            limit: None,
            seen: 0,
        })
    }

    /// Returns a session that stops the walk after `limit` records.
    #[must_use]
    pub fn session_with_limit(&self, limit: usize) -> Box<dyn UploadSession> {
        Box::new(RecordingSession {
            log: self.clone(),
            limit: Some(limit),
            seen: 0,
        })
    }

    /// Returns a session that blocks before accepting each record until the
    /// returned [`Gate`] lets it through.
    #[must_use]
    pub fn gated_session(&self) -> (Gate, Box<dyn UploadSession>) {
        let permits = Arc::new(Semaphore::new(0));
        let session = GatedSession {
            log: self.clone(),
            permits: Arc::clone(&permits),
        };
        (Gate { permits }, Box::new(session))
    }

    /// Returns a factory handing out [`UploadLog::session`]s.
    #[must_use]
    pub fn factory(&self) -> impl UploadSessionFactory {
        let log = self.clone();
        move || -> QueueResult<Box<dyn UploadSession>> { Ok(log.session()) }
    }

    /// Returns every delivered record, in delivery order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().records.clone()
    }

    /// Returns the payloads of every delivered record.
    #[must_use]
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .records
            .iter()
            .map(|r| r.payload.to_vec())
            .collect()
    }

    /// Returns the sequence numbers of every delivered record.
    #[must_use]
    pub fn sequences(&self) -> Vec<u64> {
        self.state
            .lock()
            .records
            .iter()
            .map(|r| r.sequence.as_u64())
            .collect()
    }

    /// Returns the completion status of every finished session.
    #[must_use]
    pub fn completions(&self) -> Vec<Result<(), ErrorKind>> {
        self.state.lock().completions.clone()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.completions.clear();
    }

    /// Waits until at least `count` records were delivered.
    pub async fn wait_for_records(&self, count: usize) {
        self.wait_until(|state| state.records.len() >= count).await;
    }

    /// Waits until the record with `sequence` was delivered.
    pub async fn wait_for_sequence(&self, sequence: u64) {
        self.wait_until(|state| {
            state
                .records
                .iter()
                .any(|r| r.sequence.as_u64() == sequence)
        })
        .await;
    }

    /// Waits until at least `count` sessions completed.
    pub async fn wait_for_completions(&self, count: usize) {
        self.wait_until(|state| state.completions.len() >= count)
            .await;
    }

    async fn wait_until(&self, done: impl Fn(&LogState) -> bool) {
        loop {
            // Registered before the check so no change is missed.
            let changed = self.changed.notified();
            if done(&self.state.lock()) {
                return;
            }
            changed.await;
        }
    }

    fn push_record(&self, record: Record) {
        self.state.lock().records.push(record);
        self.changed.notify_waiters();
    }

    fn push_completion(&self, status: Result<(), &QueueError>) {
        self.state
            .lock()
            .completions
            .push(status.map_err(QueueError::kind));
        self.changed.notify_waiters();
    }
}

/// A factory whose sessions can never be created.
#[must_use]
pub fn unavailable_factory() -> impl UploadSessionFactory {
    || -> QueueResult<Box<dyn UploadSession>> {
        Err(QueueError::unavailable("uploader is offline"))
    }
}

struct RecordingSession {
    log: UploadLog,
    limit: Option<usize>,
    seen: usize,
}

impl UploadSession for RecordingSession {
    fn process(&mut self, record: Record) -> BoxFuture<'_, bool> {
        self.log.push_record(record);
        self.seen += 1;
        let proceed = self.limit.map_or(true, |limit| self.seen < limit);
        Box::pin(async move { proceed })
    }

    fn completed(self: Box<Self>, status: Result<(), &QueueError>) {
        self.log.push_completion(status);
    }
}

/// Lets a gated session accept records.
pub struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    /// Lets `count` more records through.
    pub fn release(&self, count: usize) {
        self.permits.add_permits(count);
    }

    /// Makes the session stop the walk at its next record.
    pub fn stop(&self) {
        self.permits.close();
    }
}

struct GatedSession {
    log: UploadLog,
    permits: Arc<Semaphore>,
}

impl UploadSession for GatedSession {
    fn process(&mut self, record: Record) -> BoxFuture<'_, bool> {
        self.log.push_record(record);
        Box::pin(async move {
            match self.permits.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    true
                }
                Err(_) => false,
            }
        })
    }

    fn completed(self: Box<Self>, status: Result<(), &QueueError>) {
        self.log.push_completion(status);
    }
}

/// Builds a record, for comparing against what a session received.
#[must_use]
pub fn record(sequence: u64, payload: &[u8]) -> Record {
    Record {
        sequence: SequenceNumber::new(sequence),
        payload: Bytes::copy_from_slice(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limited_session_stops_at_limit() {
        let log = UploadLog::new();
        let mut session = log.session_with_limit(2);

        assert!(session.process(record(0, b"a")).await);
        assert!(!session.process(record(1, b"b")).await);
        session.completed(Ok(()));

        assert_eq!(log.sequences(), vec![0, 1]);
        assert_eq!(log.completions(), vec![Ok(())]);
    }

    #[tokio::test]
    async fn completion_records_error_kind() {
        let log = UploadLog::new();
        let session = log.session();
        let err = QueueError::data_loss("q.0", "hash mismatch");
        session.completed(Err(&err));

        assert_eq!(log.completions(), vec![Err(ErrorKind::DataLoss)]);
    }

    #[tokio::test]
    async fn gate_holds_session_until_released() {
        let log = UploadLog::new();
        let (gate, mut session) = log.gated_session();

        let task = tokio::spawn(async move {
            let accepted = session.process(record(0, b"a")).await;
            (accepted, session)
        });
        log.wait_for_records(1).await;
        assert!(!task.is_finished());

        gate.release(1);
        let (accepted, _) = task.await.unwrap();
        assert!(accepted);
    }

    #[tokio::test]
    async fn stopped_gate_ends_walk() {
        let log = UploadLog::new();
        let (gate, mut session) = log.gated_session();

        gate.stop();
        assert!(!session.process(record(0, b"a")).await);
        assert_eq!(log.sequences(), vec![0]);
    }

    #[test]
    fn unavailable_factory_fails() {
        let factory = unavailable_factory();
        let err = factory.new_session().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
