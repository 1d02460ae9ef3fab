// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::io;

use crate::{Flush, ReadAt, WriteAt};

/// In-memory [`ReadAt`]/[`WriteAt`] backend.
///
/// Useful for tests and for building disk images without touching the
/// filesystem. Reads past the end behave like end-of-file; writes past the
/// end are an error (the image does not grow implicitly).
#[derive(Debug)]
pub struct MemIo {
    data: RefCell<Vec<u8>>,
}

impl MemIo {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: RefCell::new(data),
        }
    }

    /// Zero-filled image of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }

    /// Consumes the backend and returns the image bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data.into_inner()
    }

    /// Runs `f` over the raw image bytes (e.g. to corrupt them in tests).
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.borrow_mut())
    }
}

impl ReadAt for MemIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data.borrow();

        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };

        if start >= data.len() {
            return Ok(0);
        }

        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);

        Ok(n)
    }
}

impl WriteAt for MemIo {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut data = self.data.borrow_mut();

        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;

        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "write past end of image")
            })?;

        data[start..end].copy_from_slice(buf);

        Ok(buf.len())
    }
}

impl Flush for MemIo {
    #[inline]
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
