// SPDX-License-Identifier: MIT

//! Linux block-device facade.
//!
//! [`Device`] wraps an open device node (or regular file) and exposes the
//! kernel interfaces the partitioning and probing layers need: geometry
//! ioctls, sysfs-derived topology, advisory locks, wipe operations, and
//! BLKPG partition-table notifications.
//!
//! On non-Linux targets every kernel-dependent entry point returns
//! [`Error::NotSupported`]; pure byte-level code paths remain usable
//! against regular files.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

#[cfg(target_os = "linux")]
mod blkpg;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
mod wipe;

#[cfg(not(target_os = "linux"))]
mod stub;

#[cfg(target_os = "linux")]
mod gptdev;
#[cfg(target_os = "linux")]
pub use gptdev::PartitionDevice;

/// Default logical block size in bytes, used when the kernel does not
/// report one.
pub const DEFAULT_BLOCK_SIZE: u64 = 512;

/// Range zeroed at each end of the device by [`Device::fast_wipe`].
pub const FAST_WIPE_RANGE: u64 = 1024 * 1024;

/// Facade errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// The device is locked by another holder (non-blocking lock paths).
    #[error("device is locked by another process")]
    Busy,

    /// Kernel-dependent operation on a non-Linux target.
    #[error("not implemented on this platform")]
    NotSupported,
}

pub type Result<T = ()> = std::result::Result<T, Error>;

/// A handle over an opened block device or regular file.
///
/// The file description is shared: clones (and the handles returned by
/// [`Device::whole_disk`] for a whole disk) reference the same open file,
/// which closes once the last handle drops.
#[derive(Debug, Clone)]
pub struct Device {
    file: Arc<File>,
    dev_no: std::sync::OnceLock<u64>,
}

impl Device {
    /// Opens the device read-only with close-on-exec and non-blocking
    /// flags.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path.as_ref(), false)
    }

    /// Opens the device read-write with close-on-exec and non-blocking
    /// flags.
    pub fn from_path_for_write(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path.as_ref(), true)
    }

    /// Wraps an already-open file.
    pub fn from_file(file: File) -> Self {
        Self {
            file: Arc::new(file),
            dev_no: std::sync::OnceLock::new(),
        }
    }

    /// The underlying file.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// A shared reference to the underlying file, e.g. for section readers
    /// that outlive this handle.
    pub fn shared_file(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Flushes device buffers to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Properties of a block device, collected from sysfs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Kernel device name, as in `sda`.
    pub device_name: String,
    /// Model, from `device/model`.
    pub model: String,
    /// Serial number, from `device/serial`.
    pub serial: String,
    /// Modalias, from `device/modalias`.
    pub modalias: String,
    /// WWID, from `wwid` (falling back to `device/wwid`).
    pub wwid: String,
    /// Bus path the device is attached to.
    pub bus_path: String,
    /// Resolved `subsystem` symlink target.
    pub sub_system: String,
    /// Transport, e.g. `nvme`, `sata`, `usb`, `virtio`.
    pub transport: String,
    /// True for rotational (spinning) disks.
    pub rotational: bool,
}

