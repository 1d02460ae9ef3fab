// SPDX-License-Identifier: MIT

use std::io;

use diskio::{ReadAt, WriteAt};
use diskpart::KernelError;

use crate::{Device, Error};

/// Adapter binding a [`Device`] to the GPT engine.
///
/// Geometry is snapshotted at construction so the engine sees one
/// consistent view for the lifetime of a table.
#[derive(Debug)]
pub struct PartitionDevice {
    dev: Device,
    size: u64,
    sector_size: u64,
    io_size: u64,
}

impl Device {
    /// Snapshots this device for use with [`diskpart::Table`].
    pub fn partition_device(&self) -> crate::Result<PartitionDevice> {
        Ok(PartitionDevice {
            dev: self.clone(),
            size: self.size()?,
            sector_size: self.sector_size(),
            io_size: self.io_size(),
        })
    }
}

impl ReadAt for PartitionDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.dev.file().read_at(buf, offset)
    }
}

impl WriteAt for PartitionDevice {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.dev.file().write_at(buf, offset)
    }
}

fn kernel_error(err: crate::Error) -> KernelError {
    let io_err = match err {
        Error::Io(io_err) => io_err,
        other => return KernelError::Other(io::Error::other(other)),
    };

    match io_err.raw_os_error() {
        Some(libc::EBUSY) => KernelError::Busy,
        Some(libc::ENXIO) => KernelError::NoSuchPartition,
        _ => KernelError::Other(io_err),
    }
}

impl diskpart::Device for PartitionDevice {
    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn io_size(&self) -> u64 {
        self.io_size
    }

    fn sync(&self) -> io::Result<()> {
        self.dev.sync()
    }

    fn kernel_last_partition_num(&self) -> Result<usize, KernelError> {
        self.dev.kernel_last_partition_num().map_err(kernel_error)
    }

    fn kernel_partition_add(&self, no: usize, start: u64, length: u64) -> Result<(), KernelError> {
        self.dev
            .kernel_partition_add(no, start, length)
            .map_err(|err| kernel_error(err.into()))
    }

    fn kernel_partition_resize(
        &self,
        no: usize,
        start: u64,
        length: u64,
    ) -> Result<(), KernelError> {
        self.dev
            .kernel_partition_resize(no, start, length)
            .map_err(|err| kernel_error(err.into()))
    }

    fn kernel_partition_delete(&self, no: usize) -> Result<(), KernelError> {
        self.dev
            .kernel_partition_delete(no)
            .map_err(|err| kernel_error(err.into()))
    }
}
