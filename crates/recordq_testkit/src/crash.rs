//! Crash simulation for segment files.
//!
//! A crash mid-append leaves a segment with a verified prefix followed by a
//! partial frame or unrelated bytes. These helpers produce such files from
//! healthy ones, so recovery can be tested without killing a process.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recordq_testkit::crash::append_garbage;
//!
//! queue.close().await?;
//! append_garbage(&dir.segment_path(0), &[0xFF; 7])?;
//! let queue = dir.open(&log).await; // tail is cut back to the last frame
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Appends `bytes` to the end of the file, as if a write was torn.
pub fn append_garbage(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Cuts `count` bytes off the end of the file.
pub fn truncate_by(path: &Path, count: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(count))?;
    file.sync_all()
}

/// Inverts every bit of the byte at `offset`.
pub fn flip_byte(path: &Path, offset: usize) -> io::Result<()> {
    let mut bytes = fs::read(path)?;
    let Some(byte) = bytes.get_mut(offset) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {offset} is past end of {}", path.display()),
        ));
    };
    *byte ^= 0xFF;
    fs::write(path, &bytes)
}

/// Returns the file's length in bytes.
pub fn file_len(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn garbage_and_truncation_change_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.0");
        fs::write(&path, [0u8; 32]).unwrap();

        append_garbage(&path, &[1, 2, 3]).unwrap();
        assert_eq!(file_len(&path).unwrap(), 35);

        truncate_by(&path, 10).unwrap();
        assert_eq!(file_len(&path).unwrap(), 25);
    }

    #[test]
    fn flip_byte_inverts_one_byte() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.0");
        fs::write(&path, [0x0Fu8; 4]).unwrap();

        flip_byte(&path, 2).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x0F, 0x0F, 0xF0, 0x0F]);
        assert!(flip_byte(&path, 4).is_err());
    }
}
