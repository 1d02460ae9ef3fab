// SPDX-License-Identifier: MIT

use std::io;

use diskio::{Flush, ReadAt, WriteAt};

/// Outcome of a kernel partition-table notification.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The kernel holds the partition busy (mounted, in use).
    #[error("partition is busy")]
    Busy,

    /// The kernel does not know the partition.
    #[error("partition does not exist")]
    NoSuchPartition,

    #[error("kernel notification failed")]
    Other(#[source] io::Error),
}

/// What the GPT engine needs from a disk.
///
/// The Linux block-device facade implements this for real disks; for disk
/// images there is [`ImageDevice`].
pub trait Device: ReadAt + WriteAt {
    /// Logical sector size in bytes.
    fn sector_size(&self) -> u64;

    /// Total device size in bytes.
    fn size(&self) -> u64;

    /// Preferred I/O size in bytes; used for partition alignment.
    /// Implementations fall back to the sector size when the device does
    /// not report one.
    fn io_size(&self) -> u64;

    /// Flushes written data to stable storage.
    fn sync(&self) -> io::Result<()>;

    /// Highest partition number the kernel currently knows about.
    fn kernel_last_partition_num(&self) -> Result<usize, KernelError>;

    /// Notifies the kernel of a new partition `no` at byte `start`,
    /// `length` bytes long.
    fn kernel_partition_add(&self, no: usize, start: u64, length: u64) -> Result<(), KernelError>;

    /// Notifies the kernel that partition `no` changed geometry.
    fn kernel_partition_resize(
        &self,
        no: usize,
        start: u64,
        length: u64,
    ) -> Result<(), KernelError>;

    /// Asks the kernel to forget partition `no`.
    fn kernel_partition_delete(&self, no: usize) -> Result<(), KernelError>;
}

impl<T: Device + ?Sized> Device for &T {
    fn sector_size(&self) -> u64 {
        (**self).sector_size()
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn io_size(&self) -> u64 {
        (**self).io_size()
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }

    fn kernel_last_partition_num(&self) -> Result<usize, KernelError> {
        (**self).kernel_last_partition_num()
    }

    fn kernel_partition_add(&self, no: usize, start: u64, length: u64) -> Result<(), KernelError> {
        (**self).kernel_partition_add(no, start, length)
    }

    fn kernel_partition_resize(
        &self,
        no: usize,
        start: u64,
        length: u64,
    ) -> Result<(), KernelError> {
        (**self).kernel_partition_resize(no, start, length)
    }

    fn kernel_partition_delete(&self, no: usize) -> Result<(), KernelError> {
        (**self).kernel_partition_delete(no)
    }
}

/// [`Device`] adapter for disk images (regular files, in-memory buffers).
///
/// Kernel notifications behave like an empty kernel view: deletes report
/// "does not exist", adds and resizes are accepted and dropped. The write
/// path therefore runs unchanged against images.
#[derive(Debug)]
pub struct ImageDevice<IO> {
    io: IO,
    size: u64,
    sector_size: u64,
}

impl<IO: ReadAt + WriteAt + Flush> ImageDevice<IO> {
    pub fn new(io: IO, size: u64, sector_size: u64) -> Self {
        Self {
            io,
            size,
            sector_size,
        }
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl ImageDevice<std::fs::File> {
    /// Adapter over an image file, sized from its metadata.
    pub fn from_file(file: std::fs::File, sector_size: u64) -> io::Result<Self> {
        let size = file.metadata()?.len();

        Ok(Self::new(file, size, sector_size))
    }
}

impl<IO: ReadAt> ReadAt for ImageDevice<IO> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.io.read_at(buf, offset)
    }
}

impl<IO: WriteAt> WriteAt for ImageDevice<IO> {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.io.write_at(buf, offset)
    }
}

impl<IO: ReadAt + WriteAt + Flush> Device for ImageDevice<IO> {
    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn io_size(&self) -> u64 {
        self.sector_size
    }

    fn sync(&self) -> io::Result<()> {
        self.io.flush()
    }

    fn kernel_last_partition_num(&self) -> Result<usize, KernelError> {
        Ok(0)
    }

    fn kernel_partition_add(&self, _no: usize, _start: u64, _length: u64) -> Result<(), KernelError> {
        Ok(())
    }

    fn kernel_partition_resize(
        &self,
        _no: usize,
        _start: u64,
        _length: u64,
    ) -> Result<(), KernelError> {
        Ok(())
    }

    fn kernel_partition_delete(&self, _no: usize) -> Result<(), KernelError> {
        Err(KernelError::NoSuchPartition)
    }
}
