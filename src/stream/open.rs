//! Chooses and opens the native backend for a stream.
//!
//! - **Hint resolution**: a memory map is only kept for read access, and keeping it forces
//!   the unbuffered path. Any other combination loses the memory-map bit.
//! - **Open parameters**: derived from the access mode alone, identical for the buffered and
//!   the raw path.
//! - **Fallback**: a failed map never fails the open; the descriptor is kept as a raw stream.

use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::warn;

use crate::core::{AccessMode, Hints, Result, StreamError};

use super::buffered::BufferedFile;
use super::mapped::MappedFile;
use super::native::NativeFile;
use super::raw::RawFile;

/// Returns the hints the stream will actually run with.
pub(crate) fn resolve_hints(mode: AccessMode, hints: Hints) -> Hints {
    let mut resolved = hints;
    if hints.contains(Hints::MEMORY_MAP) && mode == AccessMode::Read {
        resolved.insert(Hints::UNBUFFERED);
    } else {
        resolved.remove(Hints::MEMORY_MAP);
    }
    resolved
}

pub(crate) fn open_options(mode: AccessMode) -> Result<OpenOptions> {
    let mut options = OpenOptions::new();
    match mode {
        AccessMode::Read => options.read(true),
        AccessMode::Write => options.write(true).create(true).truncate(true),
        AccessMode::ReadWrite => options.read(true).write(true).create(true).truncate(false),
        AccessMode::UpdateExisting => return Err(StreamError::UnsupportedMode(mode).into()),
    };
    Ok(options)
}

/// Opens `path` with the backend selected by `hints`, which must already be resolved.
/// Returns the backend together with the hints left after a possible map fallback.
pub(crate) fn open_native(
    path: &Path,
    mode: AccessMode,
    hints: Hints,
) -> Result<(NativeFile, Hints)> {
    let options = open_options(mode)?;
    let file: File = options.open(path)?;

    if !hints.contains(Hints::UNBUFFERED) {
        return Ok((NativeFile::Buffered(BufferedFile::new(file, mode)), hints));
    }
    if !hints.contains(Hints::MEMORY_MAP) {
        return Ok((NativeFile::Raw(RawFile::new(file)), hints));
    }

    Ok(map_or_raw(path, MappedFile::map(file), hints))
}

/// Keeps a successful map, or demotes the returned descriptor to a raw stream without
/// the memory-map bit.
fn map_or_raw(
    path: &Path,
    mapped: std::result::Result<MappedFile, (File, anyhow::Error)>,
    hints: Hints,
) -> (NativeFile, Hints) {
    match mapped {
        Ok(mapped) => (NativeFile::Mapped(mapped), hints),
        Err((file, err)) => {
            warn!(
                "Unable to map {}, falling back to raw descriptor: {}",
                path.display(),
                err
            );
            let mut hints = hints;
            hints.remove(Hints::MEMORY_MAP);
            (NativeFile::Raw(RawFile::new(file)), hints)
        }
    }
}
