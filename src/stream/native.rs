use crate::core::{BackendKind, Result, Whence};

use super::buffered::BufferedFile;
use super::mapped::MappedFile;
use super::raw::RawFile;

/// The backend a native stream was opened with. Fixed for the stream's lifetime.
pub(crate) enum NativeFile {
    Buffered(BufferedFile),
    Raw(RawFile),
    Mapped(MappedFile),
}

impl NativeFile {
    pub fn kind(&self) -> BackendKind {
        match self {
            NativeFile::Buffered(_) => BackendKind::Buffered,
            NativeFile::Raw(_) => BackendKind::RawDescriptor,
            NativeFile::Mapped(_) => BackendKind::MemoryMapped,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            NativeFile::Buffered(file) => file.read(buf),
            NativeFile::Raw(file) => file.read(buf),
            NativeFile::Mapped(file) => file.read(buf),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            NativeFile::Buffered(file) => file.write(buf),
            NativeFile::Raw(file) => file.write(buf),
            NativeFile::Mapped(file) => file.write(buf),
        }
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        match self {
            NativeFile::Buffered(file) => file.seek(offset, whence),
            NativeFile::Raw(file) => file.seek(offset, whence),
            NativeFile::Mapped(file) => file.seek(offset, whence),
        }
    }

    pub fn tell(&mut self) -> Result<u64> {
        match self {
            NativeFile::Buffered(file) => file.tell(),
            NativeFile::Raw(file) => file.tell(),
            NativeFile::Mapped(file) => Ok(file.tell()),
        }
    }

    /// Only the buffered backend holds data back; the others have nothing to flush.
    pub fn flush(&mut self) -> Result<()> {
        match self {
            NativeFile::Buffered(file) => file.flush(),
            NativeFile::Raw(_) | NativeFile::Mapped(_) => Ok(()),
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            NativeFile::Buffered(file) => file.close(),
            NativeFile::Raw(file) => file.close(),
            NativeFile::Mapped(file) => file.close(),
        }
    }
}
