//! Stream handle and per-operation dispatch.
//!
//! Every operation runs the backend the stream was opened with and passes the result through
//! a single tracking step, which raises the sticky error flag on any `Err`. Only
//! [`FileStream::rewind`] lowers it again.

mod buffered;
mod mapped;
mod native;
mod open;
mod raw;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::core::{AccessMode, BackendKind, Hints, Result, VfsFile, Whence, utils};

pub use buffered::BUFFER_SIZE;
use native::NativeFile;

enum Backend {
    Native(NativeFile),
    External(Box<dyn VfsFile>),
}

/// An open file.
///
/// A `FileStream` owns its backend resources (descriptor, mapping, buffer) and releases them
/// on [`close`](FileStream::close) or drop. It is not synchronised: share it between threads
/// only behind a lock.
///
/// ### Example
/// ```no_run
/// use filestream_kit::{AccessMode, FileStream, Hints};
///
/// let mut out = FileStream::open("/tmp/data.bin", AccessMode::Write, Hints::NONE).unwrap();
/// out.write(b"hello").unwrap();
/// out.close().unwrap();
///
/// let mut input = FileStream::open("/tmp/data.bin", AccessMode::Read, Hints::MEMORY_MAP).unwrap();
/// let mut buf = [0u8; 5];
/// input.read(&mut buf).unwrap();
/// assert_eq!(&buf, b"hello");
/// assert!(input.eof());
/// ```
pub struct FileStream {
    path: PathBuf,
    mode: AccessMode,
    hints: Hints,
    size: u64,
    error_flag: bool,
    backend: Backend,
}

impl FileStream {
    /// Opens `path` with the native backend selected from `mode` and `hints`.
    ///
    /// `Hints::MEMORY_MAP` is honoured for [`AccessMode::Read`] only and silently dropped
    /// otherwise; if the mapping itself fails the stream falls back to the raw descriptor.
    /// The file size is measured once here and served from cache afterwards.
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode, hints: Hints) -> Result<Self> {
        let path = path.as_ref();
        let hints = open::resolve_hints(mode, hints);
        let (file, hints) = open::open_native(path, mode, hints)?;

        let mut stream = Self::new(path, mode, hints, Backend::Native(file));
        stream.size = stream.measure()?;

        debug!(
            "Opened {} ({:?}, {:?}, {} bytes)",
            path.display(),
            mode,
            stream.backend_kind(),
            stream.size
        );
        Ok(stream)
    }

    /// Wraps a file opened by an installed [`VfsInterface`](crate::VfsInterface).
    ///
    /// The interface sees the caller's hints unchanged; the stream records them resolved
    /// the same way a native open would.
    pub(crate) fn from_external(
        mode: AccessMode,
        hints: Hints,
        mut file: Box<dyn VfsFile>,
    ) -> Result<Self> {
        let path = file.path().to_path_buf();
        let size = match file.size() {
            Ok(size) => size,
            Err(err) => {
                let _ = file.close();
                return Err(err);
            }
        };
        let hints = open::resolve_hints(mode, hints);
        let mut stream = Self::new(&path, mode, hints, Backend::External(file));
        stream.size = size;

        debug!(
            "Opened {} through external interface ({:?}, {} bytes)",
            path.display(),
            mode,
            stream.size
        );
        Ok(stream)
    }

    fn new(path: &Path, mode: AccessMode, hints: Hints, backend: Backend) -> Self {
        Self {
            path: path.to_path_buf(),
            mode,
            hints,
            size: 0,
            error_flag: false,
            backend,
        }
    }

    /// Seek-to-end round trip through the dispatcher.
    fn measure(&mut self) -> Result<u64> {
        self.seek(0, Whence::Set)?;
        let size = self.seek(0, Whence::End)?;
        self.seek(0, Whence::Set)?;
        Ok(size)
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.error_flag = true;
        }
        result
    }

    /// Reads up to `buf.len()` bytes. A short count is not an error.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = match &mut self.backend {
            Backend::Native(file) => file.read(buf),
            Backend::External(file) => file.read(buf),
        };
        self.track(result)
    }

    /// Writes up to `buf.len()` bytes. Always fails on a memory-mapped stream.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let result = match &mut self.backend {
            Backend::Native(file) => file.write(buf),
            Backend::External(file) => file.write(buf),
        };
        self.track(result)
    }

    /// Moves the cursor and returns its new absolute position.
    ///
    /// On a memory-mapped stream a target outside `[0, size]` is rejected and the cursor
    /// stays where it was.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let result = match &mut self.backend {
            Backend::Native(file) => file.seek(offset, whence),
            Backend::External(file) => file.seek(offset, whence),
        };
        self.track(result)
    }

    pub fn tell(&mut self) -> Result<u64> {
        let result = match &mut self.backend {
            Backend::Native(file) => file.tell(),
            Backend::External(file) => file.tell(),
        };
        self.track(result)
    }

    pub fn flush(&mut self) -> Result<()> {
        let result = match &mut self.backend {
            Backend::Native(file) => file.flush(),
            Backend::External(file) => file.flush(),
        };
        self.track(result)
    }

    /// Size of the file at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True once the cursor has reached the size measured at open.
    pub fn eof(&mut self) -> bool {
        match self.tell() {
            Ok(position) => position >= self.size,
            Err(_) => false,
        }
    }

    /// Seeks to the start and clears the error flag, whether or not the seek succeeded.
    pub fn rewind(&mut self) {
        let _ = self.seek(0, Whence::Set);
        self.error_flag = false;
    }

    /// Returns true if any operation failed since open or the last [`rewind`](Self::rewind).
    pub fn error(&self) -> bool {
        self.error_flag
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Hints after resolution at open.
    pub fn hints(&self) -> Hints {
        self.hints
    }

    pub fn backend_kind(&self) -> BackendKind {
        match &self.backend {
            Backend::Native(file) => file.kind(),
            Backend::External(_) => BackendKind::External,
        }
    }

    /// Flushes pending data and releases every backend resource.
    pub fn close(self) -> Result<()> {
        trace!("Closing {}", self.path.display());
        match self.backend {
            Backend::Native(file) => file.close(),
            Backend::External(file) => file.close(),
        }
    }

    /// Removes the file at `path`. Returns true on success.
    pub fn delete<P: AsRef<Path>>(path: P) -> bool {
        std::fs::remove_file(path).is_ok()
    }

    /// Reads one byte, `None` at end of file or on error.
    pub fn getc(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    /// Reads at most `max_len - 1` bytes, stopping after a newline.
    /// Returns `None` if nothing could be read.
    pub fn gets(&mut self, max_len: usize) -> Option<Vec<u8>> {
        let mut line = Vec::new();
        while line.len() + 1 < max_len {
            match self.getc() {
                Some(byte) => {
                    line.push(byte);
                    if byte == b'\n' {
                        break;
                    }
                }
                None => break,
            }
        }
        if line.is_empty() { None } else { Some(line) }
    }

    /// Reads one line without its terminator. `None` at end of file.
    pub fn getline(&mut self) -> Option<String> {
        let mut line = Vec::new();
        let mut terminated = false;
        while let Some(byte) = self.getc() {
            if byte == b'\n' {
                terminated = true;
                break;
            }
            line.push(byte);
        }
        if line.is_empty() && !terminated {
            return None;
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn putc(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])?;
        Ok(())
    }

    /// Writes formatted text, returning the number of bytes written.
    ///
    /// ```no_run
    /// # use filestream_kit::{AccessMode, FileStream, Hints};
    /// let mut stream = FileStream::open("/tmp/log.txt", AccessMode::Write, Hints::NONE).unwrap();
    /// stream.printf(format_args!("{} + {} = {}\n", 2, 2, 4)).unwrap();
    /// ```
    pub fn printf(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        let text = fmt::format(args);
        if text.is_empty() {
            return Ok(0);
        }
        self.write(text.as_bytes())
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("hints", &self.hints)
            .field("size", &self.size)
            .field("error_flag", &self.error_flag)
            .field("backend", &self.backend_kind())
            .finish()
    }
}

impl io::Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileStream::read(self, buf).map_err(utils::into_io_error)
    }
}

impl io::Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileStream::write(self, buf).map_err(utils::into_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileStream::flush(self).map_err(utils::into_io_error)
    }
}

impl io::Seek for FileStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(offset) => (
                i64::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                Whence::Set,
            ),
            io::SeekFrom::Current(offset) => (offset, Whence::Cur),
            io::SeekFrom::End(offset) => (offset, Whence::End),
        };
        FileStream::seek(self, offset, whence).map_err(utils::into_io_error)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, SeekFrom, Write as _};

    use super::*;
    use crate::core::StreamError;
    use tempdir::TempDir;

    const ALL_READ_HINTS: [Hints; 3] = [
        Hints::NONE,
        Hints::UNBUFFERED,
        Hints::from_bits(Hints::MEMORY_MAP.bits() | Hints::UNBUFFERED.bits()),
    ];

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    mod open {
        use super::*;

        #[test]
        fn test_missing_file_for_read() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("missing.bin");
            for hints in [Hints::NONE, Hints::UNBUFFERED, Hints::MEMORY_MAP] {
                assert!(FileStream::open(&path, AccessMode::Read, hints).is_err());
            }
        }

        #[test]
        fn test_memory_map_for_write_is_downgraded() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("out.bin");

            let stream = FileStream::open(&path, AccessMode::Write, Hints::MEMORY_MAP).unwrap();
            assert_eq!(stream.backend_kind(), BackendKind::Buffered);
            assert!(!stream.hints().contains(Hints::MEMORY_MAP));
            stream.close().unwrap();

            let stream = FileStream::open(
                &path,
                AccessMode::ReadWrite,
                Hints::MEMORY_MAP | Hints::UNBUFFERED,
            )
            .unwrap();
            assert_eq!(stream.backend_kind(), BackendKind::RawDescriptor);
            stream.close().unwrap();
        }

        #[test]
        fn test_memory_map_for_read() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("in.bin");
            std::fs::write(&path, b"mapped").unwrap();

            let stream = FileStream::open(&path, AccessMode::Read, Hints::MEMORY_MAP).unwrap();
            assert_eq!(stream.backend_kind(), BackendKind::MemoryMapped);
            assert!(stream.hints().contains(Hints::UNBUFFERED));
            assert_eq!(stream.mode(), AccessMode::Read);
            assert_eq!(stream.path(), path.as_path());
        }

        #[test]
        fn test_update_existing_fails() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("in.bin");
            std::fs::write(&path, b"x").unwrap();

            let err = FileStream::open(&path, AccessMode::UpdateExisting, Hints::NONE).unwrap_err();
            assert_eq!(
                err.downcast_ref::<StreamError>(),
                Some(&StreamError::UnsupportedMode(AccessMode::UpdateExisting))
            );
        }

        #[test]
        fn test_new_stream_is_clean() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("in.bin");
            std::fs::write(&path, b"abc").unwrap();

            for hints in ALL_READ_HINTS {
                let mut stream = FileStream::open(&path, AccessMode::Read, hints).unwrap();
                assert!(!stream.error());
                assert_eq!(stream.tell().unwrap(), 0);
            }
        }
    }

    mod size {
        use super::*;

        #[test]
        fn test_size_matches_file_length() {
            let temp_dir = setup_test_env();
            for len in [0, 1, BUFFER_SIZE + 1] {
                let path = temp_dir.path().join(format!("len_{}.bin", len));
                std::fs::write(&path, content(len)).unwrap();

                for hints in ALL_READ_HINTS {
                    let stream = FileStream::open(&path, AccessMode::Read, hints).unwrap();
                    assert_eq!(stream.size(), len as u64, "{:?} len {}", hints, len);
                }
            }
        }

        #[test]
        fn test_size_is_cached() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("grow.bin");
            std::fs::write(&path, b"1234").unwrap();

            let mut stream = FileStream::open(&path, AccessMode::ReadWrite, Hints::NONE).unwrap();
            stream.seek(0, Whence::End).unwrap();
            stream.write(b"5678").unwrap();
            stream.flush().unwrap();
            assert_eq!(stream.size(), 4);
            assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
        }
    }

    mod round_trip {
        use super::*;

        #[test]
        fn test_write_rewind_read() {
            let temp_dir = setup_test_env();
            let data = content(BUFFER_SIZE * 2 + 3);

            for hints in [Hints::NONE, Hints::UNBUFFERED] {
                let path = temp_dir.path().join(format!("rt_{}.bin", hints.bits()));
                let mut stream = FileStream::open(&path, AccessMode::ReadWrite, hints).unwrap();
                let mut written = 0;
                while written < data.len() {
                    written += stream.write(&data[written..]).unwrap();
                }
                stream.rewind();

                let mut back = vec![0u8; data.len()];
                let mut read = 0;
                while read < back.len() {
                    let n = stream.read(&mut back[read..]).unwrap();
                    assert!(n > 0);
                    read += n;
                }
                assert_eq!(back, data);
                assert!(!stream.error());
                stream.close().unwrap();
            }
        }

        #[test]
        fn test_write_then_map() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("hundred.bin");
            let data = content(100);

            let mut out = FileStream::open(&path, AccessMode::Write, Hints::NONE).unwrap();
            assert_eq!(out.write(&data).unwrap(), 100);
            out.close().unwrap();

            let mut input = FileStream::open(&path, AccessMode::Read, Hints::MEMORY_MAP).unwrap();
            assert_eq!(input.backend_kind(), BackendKind::MemoryMapped);
            assert_eq!(input.size(), 100);

            let mut back = [0u8; 100];
            assert_eq!(input.read(&mut back).unwrap(), 100);
            assert_eq!(&back[..], &data[..]);
            input.close().unwrap();
        }
    }

    mod mapped {
        use super::*;

        fn open_mapped(temp_dir: &TempDir, data: &[u8]) -> FileStream {
            let path = temp_dir.path().join("mapped.bin");
            std::fs::write(&path, data).unwrap();
            let stream = FileStream::open(&path, AccessMode::Read, Hints::MEMORY_MAP).unwrap();
            assert_eq!(stream.backend_kind(), BackendKind::MemoryMapped);
            stream
        }

        #[test]
        fn test_end_past_size_fails_in_place() {
            let temp_dir = setup_test_env();
            let mut stream = open_mapped(&temp_dir, b"12345");
            stream.seek(2, Whence::Set).unwrap();

            assert!(stream.seek(10, Whence::End).is_err());
            assert!(stream.error());
            assert_eq!(stream.tell().unwrap(), 2);
        }

        #[test]
        fn test_negative_set_fails_in_place() {
            let temp_dir = setup_test_env();
            let mut stream = open_mapped(&temp_dir, b"12345");
            stream.seek(1, Whence::Set).unwrap();

            assert!(stream.seek(-1, Whence::Set).is_err());
            assert_eq!(stream.tell().unwrap(), 1);
        }

        #[test]
        fn test_end_zero_is_size() {
            let temp_dir = setup_test_env();
            let mut stream = open_mapped(&temp_dir, b"12345");
            assert_eq!(stream.seek(0, Whence::End).unwrap(), stream.size());
            assert!(stream.eof());
        }

        #[test]
        fn test_cur_overflow_fails_in_place() {
            let temp_dir = setup_test_env();
            let mut stream = open_mapped(&temp_dir, b"12345");
            stream.seek(3, Whence::Set).unwrap();

            assert!(stream.seek(i64::MAX, Whence::Cur).is_err());
            assert_eq!(stream.tell().unwrap(), 3);
        }

        #[test]
        fn test_write_fails_and_sets_error() {
            let temp_dir = setup_test_env();
            let mut stream = open_mapped(&temp_dir, b"12345");
            assert!(stream.write(b"x").is_err());
            assert!(stream.error());
        }
    }

    mod status {
        use super::*;

        #[test]
        fn test_eof_after_reading_size_bytes() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("eof.bin");
            let data = content(BUFFER_SIZE + 5);
            std::fs::write(&path, &data).unwrap();

            for hints in ALL_READ_HINTS {
                let mut stream = FileStream::open(&path, AccessMode::Read, hints).unwrap();
                assert!(!stream.eof());

                let mut buf = vec![0u8; data.len()];
                let mut read = 0;
                while read < buf.len() {
                    read += stream.read(&mut buf[read..]).unwrap();
                }
                assert!(stream.eof(), "{:?}", hints);
            }
        }

        #[test]
        fn test_error_is_sticky_until_rewind() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("sticky.bin");
            std::fs::write(&path, b"abc").unwrap();

            let mut stream = FileStream::open(&path, AccessMode::Read, Hints::UNBUFFERED).unwrap();
            assert!(stream.write(b"nope").is_err());
            assert!(stream.error());

            let mut buf = [0u8; 3];
            assert_eq!(stream.read(&mut buf).unwrap(), 3);
            assert!(stream.error());

            stream.rewind();
            assert!(!stream.error());
            assert_eq!(stream.tell().unwrap(), 0);
        }

        #[test]
        fn test_buffered_write_on_read_stream_fails_without_losing_reads() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("ro.bin");
            std::fs::write(&path, b"abc").unwrap();

            let mut stream = FileStream::open(&path, AccessMode::Read, Hints::NONE).unwrap();
            let err = stream.write(b"x").unwrap_err();
            assert_eq!(
                err.downcast_ref::<StreamError>(),
                Some(&StreamError::NotWritable)
            );
            assert!(stream.error());

            let mut buf = [0u8; 3];
            assert_eq!(stream.read(&mut buf).unwrap(), 3);
            assert_eq!(&buf, b"abc");
            stream.close().unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        }

        #[test]
        fn test_buffered_read_on_write_stream_fails() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("wo.bin");

            let mut stream = FileStream::open(&path, AccessMode::Write, Hints::NONE).unwrap();
            stream.write(b"out").unwrap();

            let mut buf = [0u8; 3];
            let err = stream.read(&mut buf).unwrap_err();
            assert_eq!(
                err.downcast_ref::<StreamError>(),
                Some(&StreamError::NotReadable)
            );
            assert!(stream.error());

            stream.close().unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), b"out");
        }

        #[test]
        fn test_short_read_is_not_error() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("short.bin");
            std::fs::write(&path, b"ab").unwrap();

            for hints in ALL_READ_HINTS {
                let mut stream = FileStream::open(&path, AccessMode::Read, hints).unwrap();
                let mut buf = [0u8; 10];
                assert_eq!(stream.read(&mut buf).unwrap(), 2);
                assert_eq!(stream.read(&mut buf).unwrap(), 0);
                assert!(!stream.error());
            }
        }

        #[test]
        fn test_delete() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("gone.bin");
            std::fs::write(&path, b"x").unwrap();

            assert!(FileStream::delete(&path));
            assert!(!path.exists());
            assert!(!FileStream::delete(&path));
        }
    }

    mod convenience {
        use super::*;

        fn open_text(temp_dir: &TempDir, text: &str) -> FileStream {
            let path = temp_dir.path().join("text.txt");
            std::fs::write(&path, text).unwrap();
            FileStream::open(&path, AccessMode::Read, Hints::NONE).unwrap()
        }

        #[test]
        fn test_getc() {
            let temp_dir = setup_test_env();
            let mut stream = open_text(&temp_dir, "ab");
            assert_eq!(stream.getc(), Some(b'a'));
            assert_eq!(stream.getc(), Some(b'b'));
            assert_eq!(stream.getc(), None);
        }

        #[test]
        fn test_gets_stops_at_newline_and_limit() {
            let temp_dir = setup_test_env();
            let mut stream = open_text(&temp_dir, "first\nsecond line\n");
            assert_eq!(stream.gets(64).unwrap(), b"first\n");
            assert_eq!(stream.gets(4).unwrap(), b"sec");
            assert_eq!(stream.gets(64).unwrap(), b"ond line\n");
            assert_eq!(stream.gets(64), None);
        }

        #[test]
        fn test_getline() {
            let temp_dir = setup_test_env();
            let mut stream = open_text(&temp_dir, "one\n\nthree");
            assert_eq!(stream.getline().as_deref(), Some("one"));
            assert_eq!(stream.getline().as_deref(), Some(""));
            assert_eq!(stream.getline().as_deref(), Some("three"));
            assert_eq!(stream.getline(), None);
        }

        #[test]
        fn test_putc_and_printf() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("fmt.txt");

            let mut stream = FileStream::open(&path, AccessMode::Write, Hints::UNBUFFERED).unwrap();
            stream.putc(b'>').unwrap();
            assert_eq!(stream.printf(format_args!(" {}={}\n", "x", 42)).unwrap(), 6);
            assert_eq!(stream.printf(format_args!("")).unwrap(), 0);
            stream.close().unwrap();

            assert_eq!(std::fs::read_to_string(&path).unwrap(), "> x=42\n");
        }

        #[test]
        fn test_std_io_traits() {
            let temp_dir = setup_test_env();
            let path = temp_dir.path().join("io.txt");

            let mut stream = FileStream::open(&path, AccessMode::ReadWrite, Hints::NONE).unwrap();
            write!(stream, "{}-{}", "io", 7).unwrap();
            io::Write::flush(&mut stream).unwrap();
            assert_eq!(io::Seek::seek(&mut stream, SeekFrom::Start(0)).unwrap(), 0);

            let mut text = String::new();
            stream.read_to_string(&mut text).unwrap();
            assert_eq!(text, "io-7");
        }
    }

    fn setup_test_env() -> TempDir {
        TempDir::new("stream_test").unwrap()
    }
}
