//! Ordered set of segment files.

use crate::config::QueueOptions;
use crate::dir::QueueDir;
use crate::error::{QueueError, QueueResult};
use crate::frame::{read_frame, FrameOutcome};
use crate::types::SequenceNumber;
use recordq_storage::SingleFile;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Owns every segment of one queue, keyed by first sequence number.
///
/// The highest-keyed segment is the current, writable one; all others are
/// closed for writing. Readers refer to segments by key and look them up
/// again on every access.
///
/// # Invariants
///
/// - Segment keys are strictly increasing and each segment's records are
///   contiguous, starting at its key
/// - The last segment is never deleted
/// - `first_seq <= next_seq`, and `first_seq` never decreases
#[derive(Debug)]
pub(crate) struct FileSet {
    dir: QueueDir,
    segments: BTreeMap<SequenceNumber, SingleFile>,
    first_seq: SequenceNumber,
    next_seq: SequenceNumber,
    single_file_max_size: u64,
    total_queue_max_size: u64,
    read_buffer_size: usize,
    removal_pending: bool,
}

impl FileSet {
    /// Builds the set from the segment files already in `dir`.
    ///
    /// Call [`FileSet::scan_tail`] before using the set.
    pub fn enumerate(dir: QueueDir, options: &QueueOptions) -> QueueResult<Self> {
        let mut segments = BTreeMap::new();
        for entry in dir.list_segments()? {
            let file =
                SingleFile::with_buffer_capacity(&entry.path, entry.size, options.read_buffer_size);
            segments.insert(entry.key, file);
        }

        Ok(Self {
            dir,
            segments,
            first_seq: SequenceNumber::default(),
            next_seq: SequenceNumber::default(),
            single_file_max_size: options.single_file_max_size,
            total_queue_max_size: options.total_queue_max_size,
            read_buffer_size: options.read_buffer_size,
            removal_pending: false,
        })
    }

    /// Replays the tail segment to find the next sequence number.
    ///
    /// Only a verified prefix of the tail is trusted: replay stops at the
    /// first frame that is incomplete or fails validation, and the file is
    /// truncated to the end of the last good frame.
    pub fn scan_tail(&mut self) -> QueueResult<()> {
        let Some(&first) = self.segments.keys().next() else {
            return Ok(());
        };
        self.first_seq = first;

        let Some((&key, file)) = self.segments.iter_mut().next_back() else {
            return Ok(());
        };
        file.open(false)?;

        let mut offset = 0u64;
        let mut expected = key;
        loop {
            match read_frame(file, offset, expected, false) {
                Ok(FrameOutcome::Frame(frame)) => {
                    offset = frame.next_offset;
                    expected = expected.next();
                }
                Ok(FrameOutcome::EndOfFile) => break,
                Err(QueueError::DataLoss { file: name, message }) => {
                    warn!(file = %name, %message, "dropping unverified tail of segment");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if offset < file.size() {
            warn!(
                file = %file.name(),
                verified = offset,
                size = file.size(),
                "truncating segment to last verified frame"
            );
            file.truncate(offset)?;
        }
        self.next_seq = expected;
        Ok(())
    }

    /// Returns the segment to append a frame of `frame_size` bytes to.
    ///
    /// Creates the first segment for an empty queue, and rolls over to a new
    /// segment when the current one holds records and would grow past the
    /// per-file limit.
    ///
    /// # Errors
    ///
    /// - Out-of-range if the frame alone exceeds the total queue budget
    /// - Already-exists if the new segment's key is taken
    pub fn assign_writable(&mut self, frame_size: u64) -> QueueResult<&mut SingleFile> {
        if frame_size > self.total_queue_max_size {
            return Err(QueueError::out_of_range(format!(
                "record of {frame_size} bytes exceeds queue budget of {} bytes",
                self.total_queue_max_size
            )));
        }

        let roll_over = match self.segments.values_mut().next_back() {
            None => true,
            Some(current) => {
                if current.size() > 0
                    && current.size().saturating_add(frame_size) > self.single_file_max_size
                {
                    current.close();
                    true
                } else {
                    false
                }
            }
        };
        if roll_over {
            self.create_segment(self.next_seq)?;
        }

        let Some(current) = self.segments.values_mut().next_back() else {
            return Err(QueueError::internal("no writable segment"));
        };
        current.open(false)?;
        Ok(current)
    }

    /// Closes a non-empty current segment and starts a new one, so that
    /// everything written so far becomes readable.
    ///
    /// # Errors
    ///
    /// Returns out-of-range if the queue has no segments.
    pub fn switch_if_not_empty(&mut self) -> QueueResult<()> {
        let Some(current) = self.segments.values_mut().next_back() else {
            return Err(QueueError::out_of_range("queue is empty"));
        };
        if current.size() == 0 {
            return Ok(());
        }
        current.close();
        self.create_segment(self.next_seq)
    }

    /// Returns the keys of every closed segment that may hold `start` or
    /// later, plus the first sequence number they cover.
    ///
    /// The current segment is never included.
    ///
    /// # Errors
    ///
    /// Returns out-of-range if `start` is below the retained range or no
    /// closed segment can hold it.
    pub fn collect_for_upload(
        &self,
        start: SequenceNumber,
    ) -> QueueResult<(SequenceNumber, Vec<SequenceNumber>)> {
        if start < self.first_seq {
            return Err(QueueError::out_of_range(format!(
                "sequence number {} is below first retained {}",
                start.as_u64(),
                self.first_seq.as_u64()
            )));
        }

        let closed_count = self.segments.len().saturating_sub(1);
        let closed: Vec<SequenceNumber> = self.segments.keys().copied().take(closed_count).collect();
        let Some(owner) = closed.iter().rposition(|&key| key <= start) else {
            return Err(QueueError::out_of_range(format!(
                "sequence number {} not found",
                start.as_u64()
            )));
        };

        let keys = closed[owner..].to_vec();
        Ok((keys[0], keys))
    }

    /// Records that everything up to `confirmed` has been handled and
    /// deletes fully consumed segments.
    ///
    /// While reads are active the deletion is deferred. Confirming a
    /// sequence number that has not been written yet is a no-op.
    pub fn remove_consumed(&mut self, confirmed: SequenceNumber, active_reads: usize) {
        if confirmed >= self.next_seq {
            debug!(
                confirmed = confirmed.as_u64(),
                next = self.next_seq.as_u64(),
                "ignoring confirmation past last written record"
            );
            return;
        }
        if confirmed.next() > self.first_seq {
            self.first_seq = confirmed.next();
        }

        if active_reads > 0 {
            debug!(active_reads, "deferring segment deletion until reads finish");
            self.removal_pending = true;
            return;
        }
        self.delete_consumed();
    }

    /// Runs a deletion that was deferred by an active read.
    pub fn run_pending_removal(&mut self) {
        if self.removal_pending {
            self.delete_consumed();
        }
    }

    fn delete_consumed(&mut self) {
        self.removal_pending = false;

        let keys: Vec<SequenceNumber> = self.segments.keys().copied().collect();
        let mut deleted = false;
        for pair in keys.windows(2) {
            let (key, next_key) = (pair[0], pair[1]);
            // Segment `key` holds records up to `next_key - 1`.
            if next_key > self.first_seq {
                break;
            }
            let Some(mut file) = self.segments.remove(&key) else {
                break;
            };
            file.close();
            if let Err(e) = file.delete() {
                warn!(file = %file.name(), error = %e, "failed to delete consumed segment");
                self.segments.insert(key, file);
                break;
            }
            debug!(file = %file.name(), "deleted consumed segment");
            deleted = true;
        }

        if deleted {
            if let Err(e) = self.dir.sync() {
                warn!(error = %e, "failed to sync queue directory");
            }
        }
    }

    fn create_segment(&mut self, key: SequenceNumber) -> QueueResult<()> {
        if self.segments.contains_key(&key) {
            return Err(QueueError::already_exists(format!(
                "segment {} already exists",
                key.as_u64()
            )));
        }

        let path = self.dir.segment_path(key);
        let mut file = SingleFile::with_buffer_capacity(&path, 0, self.read_buffer_size);
        file.open(false)?;
        if file.size() > 0 {
            return Err(QueueError::already_exists(format!(
                "segment file {} already exists on disk",
                path.display()
            )));
        }
        self.segments.insert(key, file);
        self.dir.sync()?;

        debug!(key = key.as_u64(), "created segment");
        Ok(())
    }

    /// Returns the queue directory.
    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the segment with the given key.
    pub fn segment_mut(&mut self, key: SequenceNumber) -> Option<&mut SingleFile> {
        self.segments.get_mut(&key)
    }

    /// Returns the lowest retained sequence number.
    pub fn first_seq(&self) -> SequenceNumber {
        self.first_seq
    }

    /// Returns the sequence number the next write receives.
    pub fn next_seq(&self) -> SequenceNumber {
        self.next_seq
    }

    /// Advances the next sequence number after a successful append.
    pub fn advance_next_seq(&mut self) {
        self.next_seq = self.next_seq.next();
    }

    /// Returns the number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the combined size of all segments.
    pub fn total_size(&self) -> u64 {
        self.segments.values().map(SingleFile::size).sum()
    }

    /// Closes every segment handle. Files stay on disk.
    pub fn close_all(&mut self) {
        for file in self.segments.values_mut() {
            file.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::frame::{encode_frame, frame_size};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn options(dir: &TempDir) -> QueueOptions {
        QueueOptions::new(dir.path())
            .file_prefix("q")
            .single_file_max_size(64)
            .total_queue_max_size(256)
    }

    fn open_set(dir: &TempDir) -> FileSet {
        let options = options(dir);
        let queue_dir = QueueDir::open(dir.path(), "q", true).unwrap();
        let mut set = FileSet::enumerate(queue_dir, &options).unwrap();
        set.scan_tail().unwrap();
        set
    }

    fn append(set: &mut FileSet, payload: &[u8]) -> SequenceNumber {
        let seq = set.next_seq();
        let frame = encode_frame(seq, payload).unwrap();
        let file = set.assign_writable(frame.len() as u64).unwrap();
        file.append(&frame).unwrap();
        set.advance_next_seq();
        seq
    }

    fn keys(set: &FileSet) -> Vec<u64> {
        set.segments.keys().map(|k| k.as_u64()).collect()
    }

    #[test]
    fn empty_directory_starts_at_zero() {
        let dir = tempdir().unwrap();
        let set = open_set(&dir);
        assert_eq!(set.first_seq(), SequenceNumber::new(0));
        assert_eq!(set.next_seq(), SequenceNumber::new(0));
        assert_eq!(set.segment_count(), 0);
    }

    #[test]
    fn first_write_creates_segment_zero() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        append(&mut set, b"a");
        assert_eq!(keys(&set), vec![0]);
        assert!(dir.path().join("q.0").exists());
    }

    #[test]
    fn rolls_over_when_segment_would_overflow() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        // 16 + 20 -> 48 byte frames; two do not fit in 64.
        for _ in 0..3 {
            append(&mut set, &[1u8; 20]);
        }
        assert_eq!(keys(&set), vec![0, 1, 2]);
    }

    #[test]
    fn oversized_frame_still_lands_in_empty_segment() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        append(&mut set, &[1u8; 100]);
        append(&mut set, &[1u8; 100]);
        assert_eq!(keys(&set), vec![0, 1]);
    }

    #[test]
    fn frame_over_queue_budget_is_rejected() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        let err = set.assign_writable(frame_size(300)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(set.segment_count(), 0);
    }

    #[test]
    fn switch_requires_segments() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        assert_eq!(
            set.switch_if_not_empty().unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn switch_skips_empty_current_segment() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        append(&mut set, b"a");
        set.switch_if_not_empty().unwrap();
        assert_eq!(keys(&set), vec![0, 1]);
        set.switch_if_not_empty().unwrap();
        assert_eq!(keys(&set), vec![0, 1]);
    }

    #[test]
    fn collect_excludes_current_segment() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        for _ in 0..3 {
            append(&mut set, &[1u8; 20]);
        }

        let (first, collected) = set.collect_for_upload(SequenceNumber::new(1)).unwrap();
        assert_eq!(first, SequenceNumber::new(1));
        assert_eq!(collected, vec![SequenceNumber::new(1)]);

        let err = set.collect_for_upload(SequenceNumber::new(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn collect_starts_at_owning_segment() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        for _ in 0..5 {
            append(&mut set, b"x");
        }
        set.switch_if_not_empty().unwrap();

        let (first, collected) = set.collect_for_upload(SequenceNumber::new(3)).unwrap();
        assert_eq!(first, SequenceNumber::new(0));
        assert_eq!(collected, vec![SequenceNumber::new(0)]);
    }

    #[test]
    fn remove_consumed_deletes_whole_segments_only() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        for _ in 0..4 {
            append(&mut set, &[1u8; 20]);
        }
        assert_eq!(keys(&set), vec![0, 1, 2, 3]);

        set.remove_consumed(SequenceNumber::new(1), 0);
        assert_eq!(keys(&set), vec![2, 3]);
        assert!(!dir.path().join("q.0").exists());
        assert!(!dir.path().join("q.1").exists());
        assert_eq!(set.first_seq(), SequenceNumber::new(2));
    }

    #[test]
    fn remove_consumed_keeps_last_segment() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        append(&mut set, b"a");
        append(&mut set, b"b");

        set.remove_consumed(SequenceNumber::new(1), 0);
        assert_eq!(keys(&set), vec![0]);
        assert_eq!(set.first_seq(), SequenceNumber::new(2));
    }

    #[test]
    fn remove_consumed_defers_while_reading() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        for _ in 0..3 {
            append(&mut set, &[1u8; 20]);
        }

        set.remove_consumed(SequenceNumber::new(1), 1);
        assert_eq!(keys(&set), vec![0, 1, 2]);
        assert_eq!(set.first_seq(), SequenceNumber::new(2));

        set.run_pending_removal();
        assert_eq!(keys(&set), vec![2]);
    }

    #[test]
    fn remove_consumed_ignores_unwritten_and_never_goes_back() {
        let dir = tempdir().unwrap();
        let mut set = open_set(&dir);
        append(&mut set, b"a");
        append(&mut set, b"b");

        set.remove_consumed(SequenceNumber::new(5), 0);
        assert_eq!(set.first_seq(), SequenceNumber::new(0));

        set.remove_consumed(SequenceNumber::new(1), 0);
        set.remove_consumed(SequenceNumber::new(0), 0);
        assert_eq!(set.first_seq(), SequenceNumber::new(2));
    }

    #[test]
    fn reopen_resumes_sequence() {
        let dir = tempdir().unwrap();
        {
            let mut set = open_set(&dir);
            for _ in 0..3 {
                append(&mut set, &[1u8; 20]);
            }
        }

        let set = open_set(&dir);
        assert_eq!(keys(&set), vec![0, 1, 2]);
        assert_eq!(set.first_seq(), SequenceNumber::new(0));
        assert_eq!(set.next_seq(), SequenceNumber::new(3));
    }

    #[test]
    fn scan_tail_truncates_garbage() {
        let dir = tempdir().unwrap();
        {
            let mut set = open_set(&dir);
            append(&mut set, b"a");
            append(&mut set, b"b");
        }
        let path = dir.path().join("q.0");
        let mut bytes = fs::read(&path).unwrap();
        let verified = bytes.len() as u64;
        bytes.extend_from_slice(&[0xAB; 21]);
        fs::write(&path, &bytes).unwrap();

        let mut set = open_set(&dir);
        assert_eq!(set.next_seq(), SequenceNumber::new(2));
        assert_eq!(fs::metadata(&path).unwrap().len(), verified);

        assert_eq!(append(&mut set, b"c"), SequenceNumber::new(2));
    }

    #[test]
    fn scan_tail_stops_at_corrupt_frame() {
        let dir = tempdir().unwrap();
        {
            let mut set = open_set(&dir);
            append(&mut set, b"a");
            append(&mut set, b"b");
            append(&mut set, b"c");
        }
        let path = dir.path().join("q.0");
        let mut bytes = fs::read(&path).unwrap();
        // Second frame's payload byte.
        bytes[32 + 16] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let set = open_set(&dir);
        assert_eq!(set.next_seq(), SequenceNumber::new(1));
        assert_eq!(fs::metadata(&path).unwrap().len(), 32);
    }
}
