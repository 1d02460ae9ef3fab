// SPDX-License-Identifier: MIT

//! FAT12/FAT16/FAT32 prober.

use std::io;

use diskio::ReadAt;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};
use crate::utils;

static MAGICS: [Magic; 6] = [
    Magic {
        offset: 0x52,
        value: b"MSWIN",
    },
    Magic {
        offset: 0x52,
        value: b"FAT32   ",
    },
    Magic {
        offset: 0x36,
        value: b"MSDOS",
    },
    Magic {
        offset: 0x36,
        value: b"FAT16   ",
    },
    Magic {
        offset: 0x36,
        value: b"FAT12   ",
    },
    Magic {
        offset: 0x36,
        value: b"FAT     ",
    },
];

/// BIOS parameter block prefix shared by all FAT variants.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BiosParameterBlock {
    pub ms_ignored: [u8; 3],
    pub ms_sysid: [u8; 8],
    pub ms_sector_size: U16,
    pub ms_cluster_size: u8,
    pub ms_reserved: U16,
    pub ms_fats: u8,
    pub ms_dir_entries: U16,
    /// Zero from DOS 3.31 on; then `ms_total_sect` holds the count.
    pub ms_sectors: U16,
    pub ms_media: u8,
    pub ms_fat_length: U16,
    pub ms_secs_track: U16,
    pub ms_heads: U16,
    pub ms_hidden: U32,
    pub ms_total_sect: U32,
}

impl BiosParameterBlock {
    pub fn valid(&self) -> bool {
        let sector_size = u64::from(self.ms_sector_size.get());

        self.ms_fats != 0
            && self.ms_reserved.get() != 0
            && (self.ms_media == 0xF0 || self.ms_media >= 0xF8)
            && utils::is_power_of_two(u64::from(self.ms_cluster_size))
            && utils::is_power_of_two(sector_size)
            && (512..=4096).contains(&sector_size)
    }

    pub fn sector_count(&self) -> u32 {
        match self.ms_sectors.get() {
            0 => self.ms_total_sect.get(),
            sectors => u32::from(sectors),
        }
    }
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "vfat"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let mut buf = [0u8; core::mem::size_of::<BiosParameterBlock>()];

        match r.read_exact_at(&mut buf, 0) {
            Ok(()) => {}
            // the range can be smaller than the BPB on tiny devices
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        }

        let bpb = BiosParameterBlock::read_from_bytes(&buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "BPB decode failed"))?;

        if !bpb.valid() {
            return Ok(None);
        }

        let sector_size = u32::from(bpb.ms_sector_size.get());

        Ok(Some(ScanResult {
            block_size: sector_size,
            filesystem_block_size: u32::from(bpb.ms_cluster_size) * sector_size,
            probed_size: u64::from(bpb.sector_count()) * u64::from(sector_size),
            ..ScanResult::default()
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diskio::MemIo;

    /// FAT32 boot sector the way mkfs.fat lays one out: `total_sect` is
    /// slightly below the device size once reserved sectors are carved out.
    pub(crate) fn sample_image(size: usize, total_sect: u32) -> Vec<u8> {
        let mut image = vec![0u8; size];

        let mut bpb =
            BiosParameterBlock::read_from_bytes(&[0u8; core::mem::size_of::<BiosParameterBlock>()])
                .unwrap();

        bpb.ms_ignored = [0xEB, 0x58, 0x90];
        bpb.ms_sysid = *b"mkfs.fat";
        bpb.ms_sector_size = U16::new(512);
        bpb.ms_cluster_size = 16;
        bpb.ms_reserved = U16::new(32);
        bpb.ms_fats = 2;
        bpb.ms_media = 0xF8;
        bpb.ms_total_sect = U32::new(total_sect);

        image[..core::mem::size_of::<BiosParameterBlock>()].copy_from_slice(bpb.as_bytes());
        image[0x52..0x5A].copy_from_slice(b"FAT32   ");
        image[0x1FE..0x200].copy_from_slice(&[0x55, 0xAA]);

        image
    }

    #[test]
    fn probes_fat32() {
        let size = 500 * 1024 * 1024;
        let io = MemIo::new(sample_image(size, 1_023_939));
        let r = ProbeReader::new(&io, 0, size as u64, 512);

        let res = Probe.probe(&r, &MAGICS[1]).unwrap().unwrap();

        assert_eq!(res.block_size, 512);
        assert_eq!(res.filesystem_block_size, 8192);
        assert_eq!(res.probed_size, 524_256_768);
        assert_eq!(res.uuid, None);
        assert_eq!(res.label, None);
    }

    #[test]
    fn rejects_bad_media_byte() {
        let size = 1024 * 1024;
        let mut image = sample_image(size, 2048);
        image[0x15] = 0x55;

        let io = MemIo::new(image);
        let r = ProbeReader::new(&io, 0, size as u64, 512);

        assert!(Probe.probe(&r, &MAGICS[1]).unwrap().is_none());
    }

    #[test]
    fn truncated_range_is_not_vfat() {
        let io = MemIo::new(vec![0u8; 16]);
        let r = ProbeReader::new(&io, 0, 16, 512);

        assert!(Probe.probe(&r, &MAGICS[0]).unwrap().is_none());
    }
}
