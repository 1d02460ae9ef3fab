// SPDX-License-Identifier: MIT

//! squashfs prober (version 4 and later).

use std::io;

use diskio::ReadStructAt;
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

static MAGICS: [Magic; 2] = [
    // big endian
    Magic {
        offset: 0,
        value: b"sqsh",
    },
    // little endian
    Magic {
        offset: 0,
        value: b"hsqs",
    },
];

/// Superblock prefix, little-endian.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SuperBlock {
    pub magic: U32,
    pub inode_count: U32,
    pub mod_time: U32,
    pub block_size: U32,
    pub frag_count: U32,
    pub compressor: U16,
    pub block_log: U16,
    pub flags: U16,
    pub id_count: U16,
    pub version_major: U16,
    pub version_minor: U16,
    pub root_inode: U64,
    pub bytes_used: U64,
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "squashfs"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let sb: SuperBlock = r.read_struct_at(0)?;

        if sb.version_major.get() < 4 {
            return Ok(None);
        }

        Ok(Some(ScanResult {
            block_size: sb.block_size.get(),
            filesystem_block_size: sb.block_size.get(),
            probed_size: sb.bytes_used.get(),
            ..ScanResult::default()
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diskio::MemIo;

    pub(crate) fn sample_image(size: usize) -> Vec<u8> {
        let mut sb =
            SuperBlock::read_from_bytes(&[0u8; core::mem::size_of::<SuperBlock>()]).unwrap();

        sb.magic = U32::new(u32::from_le_bytes(*b"hsqs"));
        sb.inode_count = U32::new(12);
        sb.block_size = U32::new(0x20000);
        sb.block_log = U16::new(17);
        sb.compressor = U16::new(1);
        sb.version_major = U16::new(4);
        sb.bytes_used = U64::new(0x100554);

        let mut image = vec![0u8; size];
        image[..core::mem::size_of::<SuperBlock>()].copy_from_slice(sb.as_bytes());

        image
    }

    #[test]
    fn probes_v4_superblock() {
        let size = 2 * 1024 * 1024;
        let io = MemIo::new(sample_image(size));
        let r = ProbeReader::new(&io, 0, size as u64, 512);

        let res = Probe.probe(&r, &MAGICS[1]).unwrap().unwrap();

        assert_eq!(res.block_size, 0x20000);
        assert_eq!(res.probed_size, 0x100554);
    }

    #[test]
    fn old_versions_are_rejected() {
        let size = 1024 * 1024;
        let mut image = sample_image(size);
        // version_major = 3
        image[28..30].copy_from_slice(&3u16.to_le_bytes());

        let io = MemIo::new(image);
        let r = ProbeReader::new(&io, 0, size as u64, 512);

        assert!(Probe.probe(&r, &MAGICS[1]).unwrap().is_none());
    }
}
