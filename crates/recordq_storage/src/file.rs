//! File handle for a single queue segment.

use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default capacity of the sequential read buffer (1 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// A handle to one on-disk segment file.
///
/// The handle tracks the file size itself: appends always land at the
/// tracked end of file, and reads never look past it. Sequential reads are
/// served from a single reusable buffer. A read may skip forward within the
/// buffered window; a read at any position outside it discards the buffer
/// and starts over.
///
/// # Durability
///
/// - `append()` writes every byte or reports failure and rolls the file
///   back to its previous length (best-effort)
/// - `sync()` calls `File::sync_data()`
///
/// # Example
///
/// ```no_run
/// use recordq_storage::SingleFile;
/// use std::path::Path;
///
/// let mut file = SingleFile::new(Path::new("queue.0"), 0);
/// file.open(false).unwrap();
/// let offset = file.append(b"persistent data").unwrap();
/// file.sync().unwrap();
/// assert_eq!(offset, 0);
/// ```
#[derive(Debug)]
pub struct SingleFile {
    path: PathBuf,
    size: u64,
    handle: Option<File>,
    read_only: bool,
    buffer: Vec<u8>,
    buffer_capacity: usize,
    /// File offset of `buffer[0]`.
    buffer_offset: u64,
    /// Number of valid bytes in `buffer`.
    buffer_len: usize,
}

impl SingleFile {
    /// Creates a closed handle for the file at `path` with a known size.
    #[must_use]
    pub fn new(path: &Path, size: u64) -> Self {
        Self::with_buffer_capacity(path, size, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Creates a closed handle with a custom read buffer capacity.
    #[must_use]
    pub fn with_buffer_capacity(path: &Path, size: u64, buffer_capacity: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
            handle: None,
            read_only: false,
            buffer: Vec::new(),
            buffer_capacity,
            buffer_offset: 0,
            buffer_len: 0,
        }
    }

    /// Opens the backing file.
    ///
    /// A writable open creates the file if it is missing and refreshes the
    /// tracked size from the file's actual length. Re-opening an open handle
    /// in the same mode is a no-op; a different mode reopens it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read.
    pub fn open(&mut self, read_only: bool) -> StorageResult<()> {
        if self.handle.is_some() {
            if self.read_only == read_only {
                return Ok(());
            }
            self.close();
        }

        let file = if read_only {
            OpenOptions::new().read(true).open(&self.path)?
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            self.size = file.metadata()?.len();
            file
        };

        self.handle = Some(file);
        self.read_only = read_only;
        self.reset_buffer(0);
        Ok(())
    }

    /// Releases the OS handle and the read buffer. Idempotent.
    pub fn close(&mut self) {
        self.handle = None;
        self.buffer = Vec::new();
        self.reset_buffer(0);
    }

    /// Returns up to `size` bytes starting at `position`.
    ///
    /// The returned slice is shorter than `size` only when the file ends
    /// first.
    ///
    /// # Errors
    ///
    /// - [`StorageError::ReadTooLarge`] if `size` exceeds the buffer capacity
    /// - [`StorageError::ReadPastEnd`] if no bytes are available at `position`
    /// - [`StorageError::Closed`] if the handle is not open
    pub fn read(&mut self, position: u64, size: usize) -> StorageResult<&[u8]> {
        if size > self.buffer_capacity {
            return Err(StorageError::ReadTooLarge {
                requested: size,
                capacity: self.buffer_capacity,
            });
        }
        let Some(file) = self.handle.as_mut() else {
            return Err(StorageError::Closed(self.path.display().to_string()));
        };
        if position >= self.size {
            return Err(StorageError::ReadPastEnd {
                offset: position,
                size: self.size,
            });
        }

        if position < self.buffer_offset || position > self.buffer_offset + self.buffer_len as u64 {
            self.buffer_offset = position;
            self.buffer_len = 0;
        }
        if self.buffer.len() < self.buffer_capacity {
            self.buffer.resize(self.buffer_capacity, 0);
        }

        let mut start = (position - self.buffer_offset) as usize;
        if self.buffer_len - start < size {
            // Slide the unread tail to the front, then top the buffer up.
            self.buffer.copy_within(start..self.buffer_len, 0);
            self.buffer_len -= start;
            self.buffer_offset = position;
            start = 0;

            let mut file_offset = self.buffer_offset + self.buffer_len as u64;
            file.seek(SeekFrom::Start(file_offset))?;
            while self.buffer_len < size && file_offset < self.size {
                let remaining = (self.size - file_offset).min(usize::MAX as u64) as usize;
                let want = (self.buffer_capacity - self.buffer_len).min(remaining);
                let target = &mut self.buffer[self.buffer_len..self.buffer_len + want];
                let n = match file.read(target) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                self.buffer_len += n;
                file_offset += n as u64;
            }
        }

        let available = size.min(self.buffer_len - start);
        if available == 0 && size > 0 {
            return Err(StorageError::ReadPastEnd {
                offset: position,
                size: self.size,
            });
        }
        Ok(&self.buffer[start..start + available])
    }

    /// Appends `data` at the tracked end of file.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or read-only, or if the
    /// write fails. On a failed write the file is truncated back to its
    /// previous length when possible and the tracked size is unchanged.
    pub fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let Some(file) = self.handle.as_mut() else {
            return Err(StorageError::Closed(self.path.display().to_string()));
        };
        if self.read_only {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }

        let offset = self.size;
        file.seek(SeekFrom::Start(offset))?;
        if let Err(err) = file.write_all(data) {
            let _ = file.set_len(offset);
            return Err(err.into());
        }
        self.size += data.len() as u64;

        Ok(offset)
    }

    /// Syncs file contents to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the sync fails.
    pub fn sync(&mut self) -> StorageResult<()> {
        let Some(file) = self.handle.as_mut() else {
            return Err(StorageError::Closed(self.path.display().to_string()));
        };
        file.sync_data()?;
        Ok(())
    }

    /// Truncates the file to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or read-only, if `new_size`
    /// is greater than the current size, or if the truncation fails.
    pub fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let Some(file) = self.handle.as_mut() else {
            return Err(StorageError::Closed(self.path.display().to_string()));
        };
        if self.read_only {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }
        if new_size > self.size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, self.size
                ),
            )));
        }

        file.set_len(new_size)?;
        // The file is shorter from here on, even if the sync below fails.
        self.size = new_size;
        self.buffer_offset = 0;
        self.buffer_len = 0;
        file.sync_all()?;
        Ok(())
    }

    /// Removes the backing file. The handle must be closed first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StillOpen`] for an open handle, or an I/O
    /// error if removal fails.
    pub fn delete(&self) -> StorageResult<()> {
        if self.handle.is_some() {
            return Err(StorageError::StillOpen(self.path.display().to_string()));
        }
        fs::remove_file(&self.path)?;
        Ok(())
    }

    /// Returns the tracked file size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the read buffer capacity, the largest single read allowed.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Returns the path to the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name, for error messages.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Returns true if the OS handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns true if the handle is open read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.handle.is_some() && self.read_only
    }

    fn reset_buffer(&mut self, position: u64) {
        self.buffer_offset = position;
        self.buffer_len = 0;
    }
}
