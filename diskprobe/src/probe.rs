// SPDX-License-Identifier: MIT

//! Prober interface and the bounded reader probers run against.

use std::io;

use diskio::{ReadAt, SectionReader};
use uuid::Uuid;

use crate::magic::Magic;

/// The view a prober gets of the byte range it inspects.
///
/// Offsets are relative to the range; the prober cannot see outside it.
pub struct ProbeReader<'a> {
    section: SectionReader<&'a dyn ReadAt>,
    sector_size: u64,
}

impl<'a> ProbeReader<'a> {
    pub fn new(reader: &'a dyn ReadAt, offset: u64, length: u64, sector_size: u64) -> Self {
        Self {
            section: SectionReader::new(reader, offset, length),
            sector_size,
        }
    }

    /// Sector size of the underlying device.
    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    /// Size of the visible range in bytes.
    pub fn size(&self) -> u64 {
        self.section.len()
    }
}

impl ReadAt for ProbeReader<'_> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.section.read_at(buf, offset)
    }
}

/// Result of one prober confirming its format on a range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub uuid: Option<Uuid>,
    pub label: Option<String>,

    /// Partitions, only for partition-table layers.
    pub parts: Vec<ScanPartition>,

    /// Sector/allocation unit advertised by this layer.
    pub block_size: u32,
    /// The filesystem's logical block size.
    pub filesystem_block_size: u32,
    /// Bytes covered by the detected structure.
    pub probed_size: u64,
}

/// A partition discovered by a partition-table prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPartition {
    pub uuid: Option<Uuid>,
    pub type_uuid: Option<Uuid>,
    pub label: Option<String>,

    /// 1-based entry position.
    pub index: u32,

    /// Byte range, absolute within the probed range.
    pub offset: u64,
    pub size: u64,
}

/// A probe for one recognizable format.
pub trait Prober {
    /// Format identifier, e.g. `xfs`.
    fn name(&self) -> &'static str;

    /// Magic values that pre-select this prober.
    fn magics(&self) -> &'static [Magic];

    /// Inspects the range after a magic matched.
    ///
    /// `Ok(None)` means the format is definitively not present even though
    /// the magic matched; I/O errors propagate.
    fn probe(&self, r: &ProbeReader<'_>, magic: &Magic) -> io::Result<Option<ScanResult>>;
}
