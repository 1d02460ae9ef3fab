// SPDX-License-Identifier: MIT

//! BLKPG kernel partition-table notifications.

use std::io;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::{Device, Result};

// linux/blkpg.h
const BLKPG: libc::c_ulong = 0x1269;

const BLKPG_ADD_PARTITION: libc::c_int = 1;
const BLKPG_DEL_PARTITION: libc::c_int = 2;
const BLKPG_RESIZE_PARTITION: libc::c_int = 3;

// transient EBUSY from the kernel is retried within this window
const RETRY_WINDOW: Duration = Duration::from_secs(10);
const RETRY_PACE: Duration = Duration::from_millis(500);

#[repr(C)]
struct BlkpgPartition {
    start: i64,
    length: i64,
    pno: libc::c_int,
    devname: [u8; 64],
    volname: [u8; 64],
}

#[repr(C)]
struct BlkpgIoctlArg {
    op: libc::c_int,
    flags: libc::c_int,
    datalen: libc::c_int,
    data: *mut libc::c_void,
}

impl Device {
    /// Notifies the kernel of a new partition `no` starting at byte
    /// `start`, `length` bytes long.
    pub fn kernel_partition_add(&self, no: usize, start: u64, length: u64) -> io::Result<()> {
        self.inform(BLKPG_ADD_PARTITION, no, start, length)
    }

    /// Notifies the kernel of new geometry for partition `no`.
    pub fn kernel_partition_resize(&self, no: usize, start: u64, length: u64) -> io::Result<()> {
        self.inform(BLKPG_RESIZE_PARTITION, no, start, length)
    }

    /// Asks the kernel to forget partition `no`.
    pub fn kernel_partition_delete(&self, no: usize) -> io::Result<()> {
        self.inform(BLKPG_DEL_PARTITION, no, 0, 0)
    }

    fn inform(&self, op: libc::c_int, no: usize, start: u64, length: u64) -> io::Result<()> {
        let deadline = Instant::now() + RETRY_WINDOW;

        loop {
            let mut data = BlkpgPartition {
                start: start as i64,
                length: length as i64,
                pno: no as libc::c_int,
                devname: [0; 64],
                volname: [0; 64],
            };

            let mut arg = BlkpgIoctlArg {
                op,
                flags: 0,
                datalen: core::mem::size_of::<BlkpgPartition>() as libc::c_int,
                data: core::ptr::addr_of_mut!(data).cast(),
            };

            if unsafe {
                libc::ioctl(self.file.as_raw_fd(), BLKPG, core::ptr::addr_of_mut!(arg))
            } == 0
            {
                return Ok(());
            }

            let err = io::Error::last_os_error();

            if err.raw_os_error() == Some(libc::EBUSY) && Instant::now() < deadline {
                log::debug!("kernel partition op {op} on {no} busy, retrying");
                std::thread::sleep(RETRY_PACE);

                continue;
            }

            return Err(err);
        }
    }

    /// Highest partition number the kernel currently knows for this disk,
    /// from the sysfs block node's children.
    pub fn kernel_last_partition_num(&self) -> Result<usize> {
        let sysfs_path = self.sysfs_path()?;

        let mut last = 0;

        for entry in std::fs::read_dir(&sysfs_path)? {
            let entry = entry?;

            if !entry.file_type()?.is_dir() {
                continue;
            }

            let contents =
                match std::fs::read_to_string(entry.path().join("partition")) {
                    Ok(contents) => contents,
                    Err(_) => continue,
                };

            if let Ok(num) = contents.trim().parse::<usize>() {
                last = last.max(num);
            }
        }

        Ok(last)
    }
}
