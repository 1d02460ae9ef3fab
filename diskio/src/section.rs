// SPDX-License-Identifier: MIT

use std::io;

use crate::ReadAt;

/// Read-only view over a byte range of another reader.
///
/// Offsets passed to [`ReadAt`] are relative to the section start; reads
/// are clamped to the section length, so a consumer can never observe
/// bytes outside the range. This is what bounds a prober to a partition.
#[derive(Debug)]
pub struct SectionReader<R> {
    inner: R,
    offset: u64,
    len: u64,
}

impl<R: ReadAt> SectionReader<R> {
    pub fn new(inner: R, offset: u64, len: u64) -> Self {
        Self { inner, offset, len }
    }

    /// Length of the visible range in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute offset of the section within the underlying reader.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: ReadAt> ReadAt for SectionReader<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }

        let avail = self.len - offset;
        let n = (buf.len() as u64).min(avail) as usize;

        self.inner.read_at(&mut buf[..n], self.offset + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemIo;

    #[test]
    fn bounded_reads() {
        let io = MemIo::new((0u8..=255).collect());
        let section = SectionReader::new(&io, 16, 8);

        let mut buf = [0u8; 8];
        section.read_exact_at(&mut buf, 0).unwrap();
        assert_eq!(buf, [16, 17, 18, 19, 20, 21, 22, 23]);

        // reads are clamped at the section end
        assert_eq!(section.read_at(&mut buf, 4).unwrap(), 4);
        assert_eq!(section.read_at(&mut buf, 8).unwrap(), 0);
        assert!(section.read_exact_at(&mut buf, 4).is_err());
    }

    #[test]
    fn nested_sections() {
        let io = MemIo::new((0u8..=255).collect());
        let outer = SectionReader::new(&io, 100, 50);
        let inner = SectionReader::new(&outer, 10, 4);

        let mut buf = [0u8; 4];
        inner.read_exact_at(&mut buf, 0).unwrap();
        assert_eq!(buf, [110, 111, 112, 113]);
    }
}
