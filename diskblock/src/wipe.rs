// SPDX-License-Identifier: MIT

//! Wipe operations, from fastest to most compatible.

use std::io;
use std::os::fd::AsRawFd;

use diskio::WriteAt;

use crate::{Device, Result, FAST_WIPE_RANGE};

// linux/fs.h, hardcoded like the rest of the block ioctls
const BLKDISCARD: libc::c_ulong = 0x1277;
const BLKDISCARDZEROES: libc::c_ulong = 0x127C;
const BLKSECDISCARD: libc::c_ulong = 0x127D;
const BLKZEROOUT: libc::c_ulong = 0x127F;

impl Device {
    /// Wipes the whole device, returning the name of the method that
    /// succeeded.
    pub fn wipe(&self) -> Result<&'static str> {
        let size = self.size()?;

        self.wipe_range(0, size)
    }

    /// Wipes `[start, start + length)`.
    ///
    /// Tries, in order: secure discard, discard (only when the device
    /// guarantees discarded blocks read back as zeroes), the zero-out
    /// ioctl, and finally a userland write of zeroes. Returns the name of
    /// the method that succeeded.
    pub fn wipe_range(&self, start: u64, length: u64) -> Result<&'static str> {
        let fd = self.file.as_raw_fd();
        let range = [start, length];

        if unsafe { libc::ioctl(fd, BLKSECDISCARD, range.as_ptr()) } == 0 {
            return Ok("blksecdiscard");
        }

        let mut zeroes: libc::c_int = 0;
        if unsafe { libc::ioctl(fd, BLKDISCARDZEROES, &mut zeroes) } == 0
            && zeroes != 0
            && unsafe { libc::ioctl(fd, BLKDISCARD, range.as_ptr()) } == 0
        {
            return Ok("blkdiscardzeroes");
        }

        if unsafe { libc::ioctl(fd, BLKZEROOUT, range.as_ptr()) } == 0 {
            return Ok("blkzeroout");
        }

        self.write_zeroes(start, length)?;

        Ok("writezeroes")
    }

    /// Best-effort fast wipe: discard everything, then zero the first MiB
    /// and, when the device is at least 2 MiB, the last MiB.
    ///
    /// Faster than [`Device::wipe`] but does not guarantee the whole
    /// device reads back as zeroes.
    pub fn fast_wipe(&self) -> Result {
        let size = self.size()?;

        let range = [0u64, size];

        // TRIM-backed discard may or may not clear data, ignore failures
        unsafe { libc::ioctl(self.file.as_raw_fd(), BLKDISCARD, range.as_ptr()) };

        let wipe_length = size.min(FAST_WIPE_RANGE);
        self.wipe_range(0, wipe_length)?;

        if size >= FAST_WIPE_RANGE * 2 {
            self.wipe_range(size - FAST_WIPE_RANGE, FAST_WIPE_RANGE)?;
        }

        Ok(())
    }

    fn write_zeroes(&self, start: u64, length: u64) -> io::Result<()> {
        const CHUNK: u64 = 1024 * 1024;

        let zeroes = vec![0u8; CHUNK.min(length) as usize];

        let mut offset = start;
        let end = start + length;

        while offset < end {
            let n = (end - offset).min(CHUNK) as usize;
            self.file.as_ref().write_all_at(&zeroes[..n], offset)?;

            offset += n as u64;
        }

        Ok(())
    }
}
