// SPDX-License-Identifier: MIT

//! Non-Linux stubs: every kernel-dependent entry point reports
//! [`Error::NotSupported`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Device, DeviceProperties, Error, Result, DEFAULT_BLOCK_SIZE};

impl Device {
    pub(crate) fn open(path: &Path, write: bool) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(write)
            .open(path)?;

        Ok(Self {
            file: Arc::new(file),
            dev_no: std::sync::OnceLock::new(),
        })
    }

    pub fn size(&self) -> Result<u64> {
        Err(Error::NotSupported)
    }

    pub fn sector_size(&self) -> u64 {
        DEFAULT_BLOCK_SIZE
    }

    pub fn io_size(&self) -> u64 {
        DEFAULT_BLOCK_SIZE
    }

    pub fn is_cd(&self) -> bool {
        false
    }

    pub fn is_cd_no_media(&self) -> bool {
        false
    }

    pub fn dev_no(&self) -> Result<u64> {
        Err(Error::NotSupported)
    }

    pub fn sysfs_path(&self) -> Result<PathBuf> {
        Err(Error::NotSupported)
    }

    pub fn is_read_only(&self) -> Result<bool> {
        Err(Error::NotSupported)
    }

    pub fn is_whole_disk(&self) -> Result<bool> {
        Err(Error::NotSupported)
    }

    pub fn whole_disk(&self) -> Result<Device> {
        Err(Error::NotSupported)
    }

    pub fn is_private_device_mapper(&self) -> Result<bool> {
        Err(Error::NotSupported)
    }

    pub fn lock(&self, _exclusive: bool) -> Result {
        Err(Error::NotSupported)
    }

    pub fn try_lock(&self, _exclusive: bool) -> Result {
        Err(Error::NotSupported)
    }

    pub fn unlock(&self) -> Result {
        Err(Error::NotSupported)
    }

    pub fn wipe(&self) -> Result<&'static str> {
        Err(Error::NotSupported)
    }

    pub fn wipe_range(&self, _start: u64, _length: u64) -> Result<&'static str> {
        Err(Error::NotSupported)
    }

    pub fn fast_wipe(&self) -> Result {
        Err(Error::NotSupported)
    }

    pub fn kernel_partition_add(&self, _no: usize, _start: u64, _length: u64) -> std::io::Result<()> {
        Err(std::io::Error::other(Error::NotSupported))
    }

    pub fn kernel_partition_resize(
        &self,
        _no: usize,
        _start: u64,
        _length: u64,
    ) -> std::io::Result<()> {
        Err(std::io::Error::other(Error::NotSupported))
    }

    pub fn kernel_partition_delete(&self, _no: usize) -> std::io::Result<()> {
        Err(std::io::Error::other(Error::NotSupported))
    }

    pub fn kernel_last_partition_num(&self) -> Result<usize> {
        Err(Error::NotSupported)
    }

    pub fn properties(&self) -> Result<DeviceProperties> {
        Err(Error::NotSupported)
    }
}
