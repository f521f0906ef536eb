use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::warn;

use crate::core::{AccessMode, Result, StreamError, Whence, utils};

/// Size of the private buffer attached to every buffered stream.
pub const BUFFER_SIZE: usize = 0x4000;

/// Stream with a single private buffer shared by reads and writes.
///
/// The buffer is either holding read-ahead (`pos..filled`) or pending writes (`..pending`),
/// never both. Switching direction, seeking and closing settle it first.
/// Transfers the access mode does not allow fail before touching the buffer.
pub(crate) struct BufferedFile {
    file: File,
    readable: bool,
    writable: bool,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    pending: usize,
}

impl BufferedFile {
    pub fn new(file: File, mode: AccessMode) -> Self {
        Self {
            file,
            readable: matches!(mode, AccessMode::Read | AccessMode::ReadWrite),
            writable: matches!(mode, AccessMode::Write | AccessMode::ReadWrite),
            buf: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            filled: 0,
            pending: 0,
        }
    }

    /// Reads until `out` is full or the file is exhausted. Bytes already copied are
    /// reported even if the descriptor fails afterwards.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if !self.readable {
            return Err(StreamError::NotReadable.into());
        }
        self.flush_pending()?;
        let mut total = 0;
        while total < out.len() {
            match self.read_some(&mut out[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if total == 0 => return Err(err.into()),
                Err(_) => break,
            }
        }
        Ok(total)
    }

    fn read_some(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.filled {
            // Large requests skip the buffer entirely.
            if out.len() >= self.buf.len() {
                return self.file.read(out);
            }
            self.pos = 0;
            self.filled = 0;
            self.filled = self.file.read(&mut self.buf)?;
        }
        let count = out.len().min(self.filled - self.pos);
        out[..count].copy_from_slice(&self.buf[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(StreamError::NotWritable.into());
        }
        self.discard_read_ahead()?;
        if self.pending + data.len() > self.buf.len() {
            self.flush_pending()?;
        }
        if data.len() >= self.buf.len() {
            self.file.write_all(data)?;
        } else {
            self.buf[self.pending..self.pending + data.len()].copy_from_slice(data);
            self.pending += data.len();
        }
        Ok(data.len())
    }

    /// Returns the new absolute offset.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.flush_pending()?;
        let target = match utils::seek_from(offset, whence)? {
            // The descriptor is ahead of the logical position by the unread bytes.
            SeekFrom::Current(delta) => SeekFrom::Current(
                delta
                    .checked_sub(self.read_ahead() as i64)
                    .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?,
            ),
            target => target,
        };
        let position = self.file.seek(target)?;
        self.pos = 0;
        self.filled = 0;
        Ok(position)
    }

    pub fn tell(&mut self) -> Result<u64> {
        let physical = self.file.stream_position()?;
        Ok(physical - self.read_ahead() as u64 + self.pending as u64)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.flush_pending()?;
        Ok(self.file.flush()?)
    }

    pub fn close(mut self) -> Result<()> {
        self.flush_pending()
    }

    fn read_ahead(&self) -> usize {
        self.filled - self.pos
    }

    fn discard_read_ahead(&mut self) -> Result<()> {
        let ahead = self.read_ahead();
        if ahead > 0 {
            self.file.seek(SeekFrom::Current(-(ahead as i64)))?;
        }
        self.pos = 0;
        self.filled = 0;
        Ok(())
    }

    /// Pending bytes stay buffered until the descriptor accepts all of them.
    fn flush_pending(&mut self) -> Result<()> {
        if self.pending > 0 {
            self.file.write_all(&self.buf[..self.pending])?;
            self.pending = 0;
        }
        Ok(())
    }
}

impl Drop for BufferedFile {
    fn drop(&mut self) {
        if let Err(e) = self.flush_pending() {
            warn!("Failed to flush buffered stream: {}", e);
        }
    }
}
