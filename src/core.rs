use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Requested access to the file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only. The file must exist.
    Read,
    /// Write-only. The file is created if missing and truncated otherwise.
    Write,
    /// Read and write. The file is created if missing, existing content is kept.
    ReadWrite,
    /// Reserved. Native open always rejects it with [`StreamError::UnsupportedMode`].
    UpdateExisting,
}

/// Reference point for [`FileStream::seek`](crate::FileStream::seek).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Physical I/O path chosen for a stream at open time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Buffered,
    RawDescriptor,
    MemoryMapped,
    /// Served by an interface installed in a [`VfsRegistry`](crate::VfsRegistry).
    External,
}

/// Caller preferences for how a stream should be backed.
///
/// Hints are advisory: the open protocol keeps, forces or strips bits depending on the
/// access mode and on what the platform managed to provide. The resolved set is available
/// from [`FileStream::hints`](crate::FileStream::hints).
#[derive(Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct Hints(u32);

impl Hints {
    pub const NONE: Hints = Hints(0);
    /// Map the whole file read-only. Honoured for [`AccessMode::Read`] only.
    pub const MEMORY_MAP: Hints = Hints(1 << 0);
    /// Bypass the 16 KiB stream buffer and talk to the descriptor directly.
    pub const UNBUFFERED: Hints = Hints(1 << 8);

    pub const fn from_bits(bits: u32) -> Hints {
        Hints(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Hints) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Hints) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Hints) {
        self.0 &= !other.0;
    }
}

impl BitOr for Hints {
    type Output = Hints;

    fn bitor(self, rhs: Hints) -> Hints {
        Hints(self.0 | rhs.0)
    }
}

impl BitOrAssign for Hints {
    fn bitor_assign(&mut self, rhs: Hints) {
        self.insert(rhs);
    }
}

impl fmt::Debug for Hints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Hints::MEMORY_MAP) {
            names.push("MEMORY_MAP");
        }
        if self.contains(Hints::UNBUFFERED) {
            names.push("UNBUFFERED");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "Hints({})", names.join(" | "))
    }
}

/// Stream failures that are not plain OS errors.
///
/// Every operation returns `anyhow::Error`; these can be recovered with
/// `err.downcast_ref::<StreamError>()`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("access mode {0:?} is not supported")]
    UnsupportedMode(AccessMode),
    #[error("seek by {offset} from {whence:?} is out of range")]
    SeekOutOfRange { offset: i64, whence: Whence },
    #[error("negative absolute offset: {0}")]
    NegativeOffset(i64),
    #[error("memory-mapped streams are read-only")]
    ReadOnlyMapping,
    #[error("cursor is past the end of the mapping")]
    CursorPastEnd,
    #[error("stream is not open for reading")]
    NotReadable,
    #[error("stream is not open for writing")]
    NotWritable,
}

/// Replacement for the native backend, installed through a
/// [`VfsRegistry`](crate::VfsRegistry).
pub trait VfsInterface: Send + Sync {
    fn open(&self, path: &Path, mode: AccessMode, hints: Hints) -> Result<Box<dyn VfsFile>>;
    fn delete(&self, path: &Path) -> Result<()>;
}

/// One file opened through a [`VfsInterface`].
///
/// Offsets follow the native backends: `seek` and `tell` report the absolute position,
/// `read` and `write` may transfer fewer bytes than requested.
pub trait VfsFile {
    fn path(&self) -> &Path;
    fn size(&mut self) -> Result<u64>;
    fn tell(&mut self) -> Result<u64>;
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn flush(&mut self) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

pub(crate) mod utils {
    use std::io::{self, SeekFrom};

    use super::{Result, StreamError, Whence};

    /// Translates a signed offset into the form `std::io::Seek` accepts.
    pub fn seek_from(offset: i64, whence: Whence) -> Result<SeekFrom> {
        match whence {
            Whence::Set => u64::try_from(offset)
                .map(SeekFrom::Start)
                .map_err(|_| StreamError::NegativeOffset(offset).into()),
            Whence::Cur => Ok(SeekFrom::Current(offset)),
            Whence::End => Ok(SeekFrom::End(offset)),
        }
    }

    /// Unwraps an `io::Error` carried by `anyhow`, or wraps anything else.
    pub fn into_io_error(err: anyhow::Error) -> io::Error {
        match err.downcast::<io::Error>() {
            Ok(err) => err,
            Err(err) => io::Error::other(err),
        }
    }
}
