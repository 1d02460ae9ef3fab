// SPDX-License-Identifier: MIT

//! Positioned I/O substrate shared by the partitioning and probing crates.
//!
//! Everything here works in terms of absolute byte offsets; there is no
//! seek state, so one open file can back any number of [`SectionReader`]
//! views at once.

use std::io;

mod mem;
mod section;

pub use mem::MemIo;
pub use section::SectionReader;

/// Reads at absolute byte offsets, without moving any cursor.
pub trait ReadAt {
    /// Reads up to `buf.len()` bytes at `offset`, returning the number of
    /// bytes read. A return of 0 means end of the readable range.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Fills `buf` completely from `offset`.
    ///
    /// A short read (end of range before `buf` is full) is reported as
    /// [`io::ErrorKind::UnexpectedEof`]; interrupted reads are retried.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Writes at absolute byte offsets, without moving any cursor.
pub trait WriteAt {
    /// Writes up to `buf.len()` bytes at `offset`, returning the number of
    /// bytes written.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Writes all of `buf` at `offset`, retrying interrupted writes.
    fn write_all_at(&self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Flushes buffered data to stable storage.
pub trait Flush {
    fn flush(&self) -> io::Result<()>;
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<T: Flush + ?Sized> Flush for &T {
    #[inline]
    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<T: WriteAt + ?Sized> WriteAt for &T {
    #[inline]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset)
    }
}

#[cfg(unix)]
impl ReadAt for std::fs::File {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(unix)]
impl WriteAt for std::fs::File {
    #[inline]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }
}

impl Flush for std::fs::File {
    #[inline]
    fn flush(&self) -> io::Result<()> {
        self.sync_all()
    }
}

#[cfg(windows)]
impl ReadAt for std::fs::File {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

#[cfg(windows)]
impl WriteAt for std::fs::File {
    #[inline]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }
}

/// Reads fixed-layout on-disk structures via zerocopy.
pub trait ReadStructAt: ReadAt {
    /// Reads a `T` from `offset`.
    fn read_struct_at<T>(&self, offset: u64) -> io::Result<T>
    where
        T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        let mut buf = vec![0u8; core::mem::size_of::<T>()];
        self.read_exact_at(&mut buf, offset)?;

        T::read_from_bytes(&buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "struct decode failed"))
    }
}

impl<T: ReadAt + ?Sized> ReadStructAt for T {}

/// Writes fixed-layout on-disk structures via zerocopy.
pub trait WriteStructAt: WriteAt {
    /// Writes `val` at `offset`.
    fn write_struct_at<T>(&self, offset: u64, val: &T) -> io::Result<()>
    where
        T: zerocopy::IntoBytes + zerocopy::Immutable,
    {
        self.write_all_at(val.as_bytes(), offset)
    }
}

impl<T: WriteAt + ?Sized> WriteStructAt for T {}

/// Offset = LBA * sector_size, with overflow check.
#[inline]
fn lba_offset(lba: u64, sector_size: u64) -> io::Result<u64> {
    lba.checked_mul(sector_size)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "LBA offset overflow"))
}

/// LBA-addressed helpers, to avoid sprinkling `* sector_size` around.
pub trait LbaExt: ReadAt + WriteAt {
    #[inline]
    fn read_exact_at_lba(&self, lba: u64, sector_size: u64, buf: &mut [u8]) -> io::Result<()> {
        self.read_exact_at(buf, lba_offset(lba, sector_size)?)
    }

    #[inline]
    fn write_all_at_lba(&self, lba: u64, sector_size: u64, buf: &[u8]) -> io::Result<()> {
        self.write_all_at(buf, lba_offset(lba, sector_size)?)
    }
}

impl<T: ReadAt + WriteAt + ?Sized> LbaExt for T {}
