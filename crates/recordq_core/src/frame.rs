//! Frame encoding and decoding.
//!
//! Every record is stored as one frame:
//!
//! ```text
//! | sequence (8) | payload_size (4) | payload_hash (4) | payload (N) | padding |
//! ```
//!
//! Integers are little-endian. `payload_hash` is a CRC-32 of the payload and
//! exists only to detect corruption. Padding is random and brings the frame
//! to a multiple of [`FRAME_ALIGNMENT`] so stored sizes reveal little about
//! the records.
//!
//! ## Decoding outcomes
//!
//! - **Zero bytes at the frame offset**: clean end of segment
//! - **Anything else that does not validate** (short header, frame running
//!   past the end of the file, unexpected sequence number, hash mismatch):
//!   a data-loss error naming the segment file
//!
//! Startup recovery treats the data-loss outcome as the end of the verified
//! prefix; the read walk surfaces it.

use crate::error::{QueueError, QueueResult};
use crate::types::SequenceNumber;
use bytes::{Bytes, BytesMut};
use rand::RngCore;
use recordq_storage::{SingleFile, StorageError};

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Frames are padded to a multiple of this many bytes.
pub const FRAME_ALIGNMENT: usize = 16;

/// Fixed-size header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sequence number of the record.
    pub sequence: SequenceNumber,
    /// Payload length in bytes.
    pub payload_size: u32,
    /// CRC-32 of the payload.
    pub payload_hash: u32,
}

impl FrameHeader {
    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.sequence.as_u64().to_le_bytes());
        bytes[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.payload_hash.to_le_bytes());
        bytes
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` if fewer bytes are given.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let sequence = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let payload_size = u32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let payload_hash = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
        Some(Self {
            sequence: SequenceNumber::new(sequence),
            payload_size,
            payload_hash,
        })
    }

    /// Returns the on-disk size of the whole frame, padding included.
    #[must_use]
    pub fn frame_size(&self) -> u64 {
        frame_size(self.payload_size as usize)
    }
}

/// Returns the on-disk size of a frame carrying `payload_len` bytes.
#[must_use]
pub fn frame_size(payload_len: usize) -> u64 {
    let unpadded = (HEADER_SIZE + payload_len) as u64;
    unpadded.div_ceil(FRAME_ALIGNMENT as u64) * FRAME_ALIGNMENT as u64
}

/// Computes the payload hash stored in the frame header.
#[must_use]
pub fn payload_hash(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Encodes one frame: header, payload, then random padding.
///
/// # Errors
///
/// Returns an out-of-range error if the payload does not fit in a `u32`
/// length.
pub fn encode_frame(sequence: SequenceNumber, payload: &[u8]) -> QueueResult<Vec<u8>> {
    let payload_size = u32::try_from(payload.len()).map_err(|_| {
        QueueError::out_of_range(format!("record of {} bytes is too large", payload.len()))
    })?;
    let header = FrameHeader {
        sequence,
        payload_size,
        payload_hash: payload_hash(payload),
    };

    let total = header.frame_size() as usize;
    let mut data = Vec::with_capacity(total);
    data.extend_from_slice(&header.encode());
    data.extend_from_slice(payload);

    let padding_start = data.len();
    data.resize(total, 0);
    rand::thread_rng().fill_bytes(&mut data[padding_start..]);

    Ok(data)
}

/// A frame that passed validation.
#[derive(Debug, Clone)]
pub(crate) struct DecodedFrame {
    /// Payload bytes (empty when the payload was only verified).
    pub payload: Bytes,
    /// Offset just past this frame's padding.
    pub next_offset: u64,
}

/// Outcome of reading one frame.
#[derive(Debug)]
pub(crate) enum FrameOutcome {
    /// A valid frame.
    Frame(DecodedFrame),
    /// No bytes at the requested offset.
    EndOfFile,
}

/// Reads and validates the frame at `offset`, which must carry `expected`.
///
/// The payload is hashed in buffer-sized chunks, so frames larger than the
/// read buffer are fine. With `keep_payload` false the payload is verified
/// and dropped.
pub(crate) fn read_frame(
    file: &mut SingleFile,
    offset: u64,
    expected: SequenceNumber,
    keep_payload: bool,
) -> QueueResult<FrameOutcome> {
    let name = file.name();
    let file_size = file.size();

    let header = match file.read(offset, HEADER_SIZE) {
        Ok(bytes) => FrameHeader::decode(bytes).ok_or_else(|| {
            QueueError::data_loss(&name, format!("truncated header at offset {offset}"))
        })?,
        Err(StorageError::ReadPastEnd { .. }) => return Ok(FrameOutcome::EndOfFile),
        Err(e) => return Err(e.into()),
    };

    let next_offset = offset + header.frame_size();
    if next_offset > file_size {
        return Err(QueueError::data_loss(
            &name,
            format!(
                "frame at offset {offset} with payload of {} bytes runs past end of file ({file_size} bytes)",
                header.payload_size
            ),
        ));
    }
    if header.sequence != expected {
        return Err(QueueError::data_loss(
            &name,
            format!(
                "sequence mismatch at offset {offset}: expected {expected}, found {}",
                header.sequence
            ),
        ));
    }

    let payload_len = header.payload_size as usize;
    let chunk_limit = file.buffer_capacity();
    let mut hasher = crc32fast::Hasher::new();
    let mut payload = if keep_payload {
        BytesMut::with_capacity(payload_len)
    } else {
        BytesMut::new()
    };

    let mut position = offset + HEADER_SIZE as u64;
    let mut remaining = payload_len;
    while remaining > 0 {
        let chunk = match file.read(position, remaining.min(chunk_limit)) {
            Ok(chunk) => chunk,
            Err(StorageError::ReadPastEnd { .. }) => {
                return Err(QueueError::data_loss(
                    &name,
                    format!("truncated payload in frame at offset {offset}"),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        hasher.update(chunk);
        if keep_payload {
            payload.extend_from_slice(chunk);
        }
        position += chunk.len() as u64;
        remaining -= chunk.len();
    }

    let actual = hasher.finalize();
    if actual != header.payload_hash {
        return Err(QueueError::data_loss(
            &name,
            format!(
                "hash mismatch in frame {expected}: stored {:08x}, computed {actual:08x}",
                header.payload_hash
            ),
        ));
    }

    Ok(FrameOutcome::Frame(DecodedFrame {
        payload: payload.freeze(),
        next_offset,
    }))
}
