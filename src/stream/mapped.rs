use std::fs::File;
use std::io::{Seek, SeekFrom};

use memmap2::{Mmap, MmapOptions};

use crate::core::{Result, StreamError, Whence};

/// Read-only view of a whole file with a logical cursor.
///
/// The cursor stays within `[0, len]`: `seek` computes the target with checked arithmetic
/// and commits it only when it lands inside the mapping.
pub(crate) struct MappedFile {
    // Field order matters: the region is unmapped before the descriptor is closed.
    map: Mmap,
    file: File,
    position: u64,
}

impl MappedFile {
    /// Maps the full length of `file`. On failure the descriptor is handed back so the
    /// caller can keep using it unmapped.
    pub fn map(mut file: File) -> std::result::Result<Self, (File, anyhow::Error)> {
        let len = match Self::measure(&mut file) {
            Ok(len) => len,
            Err(err) => return Err((file, err)),
        };
        // SAFETY: the mapping is read-only and owned by this handle. Concurrent truncation
        // of the file by another process is outside the contract of the stream.
        let map = match unsafe { MmapOptions::new().len(len).map(&file) } {
            Ok(map) => map,
            Err(err) => return Err((file, err.into())),
        };
        Ok(Self {
            map,
            file,
            position: 0,
        })
    }

    fn measure(file: &mut File) -> Result<usize> {
        let end = file.seek(SeekFrom::End(0))?;
        file.rewind()?;
        Ok(usize::try_from(end)?)
    }

    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.len();
        if self.position > len {
            return Err(StreamError::CursorPastEnd.into());
        }
        let remaining = (len - self.position) as usize;
        let count = buf.len().min(remaining);
        let start = self.position as usize;
        buf[..count].copy_from_slice(&self.map[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(StreamError::ReadOnlyMapping.into())
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = self
            .target(offset, whence)
            .ok_or(StreamError::SeekOutOfRange { offset, whence })?;
        self.position = target;
        Ok(target)
    }

    fn target(&self, offset: i64, whence: Whence) -> Option<u64> {
        let len = i64::try_from(self.len()).ok()?;
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => i64::try_from(self.position).ok()?.checked_add(offset)?,
            Whence::End => len.checked_add(offset)?,
        };
        if (0..=len).contains(&target) {
            Some(target as u64)
        } else {
            None
        }
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn close(self) -> Result<()> {
        let MappedFile { map, file, .. } = self;
        drop(map);
        drop(file);
        Ok(())
    }
}
