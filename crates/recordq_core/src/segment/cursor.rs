use crate::error::{QueueError, QueueResult};
use crate::frame::{read_frame, FrameOutcome};
use crate::segment::FileSet;
use crate::types::SequenceNumber;
use crate::upload::Record;

/// Position of one read walk over the closed segments.
///
/// The cursor holds segment keys, not files; every step looks the segment up
/// in the [`FileSet`] again. Records before `start` are verified but not
/// returned.
#[derive(Debug)]
pub(crate) struct ReadCursor {
    keys: Vec<SequenceNumber>,
    index: usize,
    offset: u64,
    expected: SequenceNumber,
    start: SequenceNumber,
}

impl ReadCursor {
    /// Positions a cursor at the closed segment holding `start`.
    pub fn new(set: &FileSet, start: SequenceNumber) -> QueueResult<Self> {
        let (first, keys) = set.collect_for_upload(start)?;
        Ok(Self {
            keys,
            index: 0,
            offset: 0,
            expected: first,
            start,
        })
    }

    /// Returns the next record at or after `start`, or `None` once the
    /// collected segments are exhausted.
    ///
    /// # Errors
    ///
    /// - Data loss for a corrupt frame or a gap between segments
    /// - Out-of-range if the walk ends without reaching `start`
    pub fn next(&mut self, set: &mut FileSet) -> QueueResult<Option<Record>> {
        loop {
            let Some(&key) = self.keys.get(self.index) else {
                if self.expected <= self.start {
                    return Err(QueueError::out_of_range(format!(
                        "sequence number {} not found",
                        self.start.as_u64()
                    )));
                }
                return Ok(None);
            };

            let file = set.segment_mut(key).ok_or_else(|| {
                QueueError::internal(format!("segment {} removed during read", key.as_u64()))
            })?;
            file.open(true)?;

            let keep = self.expected >= self.start;
            match read_frame(file, self.offset, self.expected, keep)? {
                FrameOutcome::Frame(frame) => {
                    let sequence = self.expected;
                    self.offset = frame.next_offset;
                    self.expected = sequence.next();
                    if keep {
                        return Ok(Some(Record {
                            sequence,
                            payload: frame.payload,
                        }));
                    }
                }
                FrameOutcome::EndOfFile => {
                    let name = file.name();
                    file.close();
                    self.index += 1;
                    self.offset = 0;
                    if let Some(&next_key) = self.keys.get(self.index) {
                        if next_key != self.expected {
                            return Err(QueueError::data_loss(
                                name,
                                format!(
                                    "gap after segment: expected {} next, following segment starts at {}",
                                    self.expected.as_u64(),
                                    next_key.as_u64()
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Closes the segment the cursor stopped in.
    pub fn release(self, set: &mut FileSet) {
        if let Some(file) = self
            .keys
            .get(self.index)
            .and_then(|&key| set.segment_mut(key))
        {
            file.close();
        }
    }
}
