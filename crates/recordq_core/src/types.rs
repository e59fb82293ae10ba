//! Core type definitions.

use std::fmt;

/// Identifier assigned to each record when it is written.
///
/// Sequence numbers are assigned in strict write order, start at zero for a
/// new queue, and are never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(seq: u64) -> Self {
        Self(seq)
    }
}

/// Snapshot of queue bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Lowest sequence number still retained.
    pub first_seq_number: SequenceNumber,
    /// Sequence number the next write will receive.
    pub next_seq_number: SequenceNumber,
    /// Number of segment files on disk.
    pub segment_count: usize,
    /// Total size of all segment files in bytes.
    pub total_size: u64,
    /// Number of read walks currently in flight.
    pub active_reads: usize,
}
