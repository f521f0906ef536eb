//! Portable file streams with interchangeable backends.
//!
//! ### Overview
//!
//! `filestream-kit` opens files as a [`FileStream`] and serves every operation from one of
//! three native backends, chosen once at open time:
//!
//! - **Buffered**: a descriptor with a private 16 KiB buffer shared by reads and writes.
//! - **Raw descriptor**: unbuffered, one request per call.
//! - **Memory-mapped**: a read-only map of the whole file with a bounds-checked cursor.
//!
//! The backend follows from the [`AccessMode`] and the caller's [`Hints`]. Memory maps are
//! only ever used for read access and fall back to the raw descriptor if mapping fails.
//!
//! **Key ideas**:
//! - **One operation set**: read, write, seek, tell, size, flush and close behave the same
//!   on every backend; offsets are always absolute.
//! - **Sticky errors**: any failed operation raises [`FileStream::error`] until
//!   [`FileStream::rewind`].
//! - **Replaceable backend**: a [`VfsRegistry`] can route all streams to a caller-supplied
//!   [`VfsInterface`], gated by [`REQUIRED_VFS_VERSION`].

mod core;
mod registry;
mod stream;

pub use crate::core::{
    AccessMode, BackendKind, Hints, Result, StreamError, VfsFile, VfsInterface, Whence,
};
pub use registry::{REQUIRED_VFS_VERSION, VfsInterfaceInfo, VfsRegistry, read_file, write_file};
pub use stream::{BUFFER_SIZE, FileStream};
