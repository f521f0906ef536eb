use std::fs::File;
use std::io::{Read, Seek, Write};

use crate::core::{Result, Whence, utils};

/// Unbuffered stream: every call is one request to the descriptor.
pub(crate) struct RawFile {
    file: File,
}

impl RawFile {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    /// Returns the new absolute offset.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = utils::seek_from(offset, whence)?;
        Ok(self.file.seek(target)?)
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }
}
