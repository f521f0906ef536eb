//! Backend selection for opening streams.
//!
//! A [`VfsRegistry`] either holds nothing, in which case streams use the native backends, or
//! one [`VfsInterface`] that replaces them entirely. The interface is installed with
//! [`VfsRegistry::init`] and only accepted when its descriptor declares at least
//! [`REQUIRED_VFS_VERSION`].

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::core::{AccessMode, Hints, Result, VfsInterface};
use crate::stream::FileStream;

/// Lowest interface version the registry accepts.
pub const REQUIRED_VFS_VERSION: u32 = 1;

/// Descriptor handed to [`VfsRegistry::init`].
#[derive(Clone, Default)]
pub struct VfsInterfaceInfo {
    pub required_interface_version: u32,
    pub iface: Option<Arc<dyn VfsInterface>>,
}

impl VfsInterfaceInfo {
    pub fn new(required_interface_version: u32, iface: Arc<dyn VfsInterface>) -> Self {
        Self {
            required_interface_version,
            iface: Some(iface),
        }
    }
}

/// Creates streams, natively or through an installed [`VfsInterface`].
///
/// The registry is a plain value: build one per context that needs an override and pass it
/// to whatever opens files. Install the interface before opening the first stream; streams
/// that are already open keep the backend they were created with.
///
/// ### Example
/// ```no_run
/// use filestream_kit::{AccessMode, Hints, VfsRegistry};
///
/// let registry = VfsRegistry::new();
/// assert!(!registry.is_overridden());
///
/// let stream = registry.open("/tmp/data.bin", AccessMode::Read, Hints::NONE).unwrap();
/// stream.close().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct VfsRegistry {
    iface: Option<Arc<dyn VfsInterface>>,
}

impl VfsRegistry {
    /// Creates an empty registry that uses the native backends.
    pub fn new() -> Self {
        Self { iface: None }
    }

    /// Creates a registry and initializes it from `info`.
    pub fn with_interface(info: &VfsInterfaceInfo) -> Self {
        let mut registry = Self::new();
        registry.init(info);
        registry
    }

    /// Replaces the installed interface with the one described by `info`.
    ///
    /// The current interface is always dropped first. The new one is installed only if
    /// present and its version is at least [`REQUIRED_VFS_VERSION`]; otherwise the registry
    /// is left empty. Returns true if an override is active afterwards.
    pub fn init(&mut self, info: &VfsInterfaceInfo) -> bool {
        self.iface = None;

        if info.required_interface_version < REQUIRED_VFS_VERSION {
            debug!(
                "VFS interface version {} below required {}, using native backend",
                info.required_interface_version, REQUIRED_VFS_VERSION
            );
            return false;
        }
        let Some(iface) = &info.iface else {
            debug!("VFS interface missing, using native backend");
            return false;
        };

        self.iface = Some(Arc::clone(iface));
        debug!(
            "VFS interface version {} installed",
            info.required_interface_version
        );
        true
    }

    /// Removes the installed interface, if any.
    pub fn reset(&mut self) {
        self.iface = None;
    }

    pub fn is_overridden(&self) -> bool {
        self.iface.is_some()
    }

    /// Opens `path`. See [`FileStream::open`] for how `mode` and `hints` select a backend;
    /// an installed interface receives them unchanged.
    pub fn open<P: AsRef<Path>>(
        &self,
        path: P,
        mode: AccessMode,
        hints: Hints,
    ) -> Result<FileStream> {
        match &self.iface {
            Some(iface) => {
                let file = iface.open(path.as_ref(), mode, hints)?;
                FileStream::from_external(mode, hints, file)
            }
            None => FileStream::open(path, mode, hints),
        }
    }

    /// Removes the file at `path`. Returns true on success.
    pub fn delete<P: AsRef<Path>>(&self, path: P) -> bool {
        match &self.iface {
            Some(iface) => iface.delete(path.as_ref()).is_ok(),
            None => FileStream::delete(path),
        }
    }

    /// Reads the whole file.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>> {
        let mut stream = self.open(path, AccessMode::Read, Hints::NONE)?;
        let mut content = vec![0u8; usize::try_from(stream.size())?];
        let mut total = 0;
        while total < content.len() {
            let count = stream.read(&mut content[total..])?;
            if count == 0 {
                break;
            }
            total += count;
        }
        content.truncate(total);
        stream.close()?;
        Ok(content)
    }

    /// Replaces the content of the file with `data`, creating it if needed.
    pub fn write_file<P: AsRef<Path>>(&self, path: P, data: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let mut stream = self.open(path, AccessMode::Write, Hints::NONE)?;
        let written = stream.write(data);
        stream.close()?;
        let written = written?;
        if written != data.len() {
            return Err(anyhow!(
                "short write to {}: {} of {} bytes",
                path.display(),
                written,
                data.len()
            ));
        }
        Ok(())
    }
}

/// Reads the whole file through the native backend.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    VfsRegistry::new().read_file(path)
}

/// Writes `data` to `path` through the native backend.
pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    VfsRegistry::new().write_file(path, data)
}
