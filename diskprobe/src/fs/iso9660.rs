// SPDX-License-Identifier: MIT

//! ISO9660 prober.
//!
//! Volume descriptors start at 32 KiB, one per 2 KiB sector. The primary
//! descriptor is required; a Joliet supplementary descriptor, when
//! present, carries the UTF-16BE volume label that wins over the primary's
//! ASCII one.

use std::io;

use diskio::ReadAt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

const SUPERBLOCK_OFFSET: usize = 0x8000;
const SECTOR_SIZE: u64 = 2048;

const VD_MAX: usize = 16;
const VD_END: u8 = 0xFF;
const VD_BOOT_RECORD: u8 = 0;
const VD_PRIMARY: u8 = 1;
const VD_SUPPLEMENTARY: u8 = 2;

static MAGICS: [Magic; 1] = [Magic {
    offset: SUPERBLOCK_OFFSET + 1,
    value: b"CD001",
}];

/// Prefix of a volume descriptor, through the fields probing needs.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone)]
#[repr(C)]
pub struct VolumeDescriptor {
    pub vd_type: u8,
    pub vd_id: [u8; 5],
    pub vd_version: u8,
    pub flags: u8,
    pub system_id: [u8; 32],
    pub volume_id: [u8; 32],
    pub unused: [u8; 8],
    /// Both-endian 32-bit pair; only the low 16 bits are consulted.
    pub space_size: [u8; 8],
    pub escape_sequences: [u8; 32],
    pub set_size: [u8; 4],
    pub vol_seq_num: [u8; 4],
    /// Both-endian 16-bit pair.
    pub logical_block_size: [u8; 4],
}

/// The little-endian half of a both-endian 16-bit field.
fn isonum16(b: &[u8]) -> u16 {
    u16::from(b[0]) | u16::from(b[1]) << 8
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "iso9660"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let mut pvd: Option<VolumeDescriptor> = None;
        let mut joliet: Option<VolumeDescriptor> = None;

        for i in 0..VD_MAX {
            let mut buf = [0u8; core::mem::size_of::<VolumeDescriptor>()];

            // a truncated descriptor area just ends the scan
            if r.read_exact_at(&mut buf, SUPERBLOCK_OFFSET as u64 + SECTOR_SIZE * i as u64)
                .is_err()
            {
                break;
            }

            let Ok(vd) = VolumeDescriptor::read_from_bytes(&buf) else {
                break;
            };

            match vd.vd_type {
                VD_END => break,
                VD_BOOT_RECORD => {}
                VD_PRIMARY => pvd = Some(vd),
                VD_SUPPLEMENTARY => joliet = Some(vd),
                _ => {}
            }

            if pvd.is_some() && joliet.is_some() {
                break;
            }
        }

        let Some(pvd) = pvd else {
            return Ok(None);
        };

        let logical_block_size = isonum16(&pvd.logical_block_size);
        let space_size = isonum16(&pvd.space_size);

        let mut res = ScanResult {
            block_size: u32::from(logical_block_size),
            filesystem_block_size: u32::from(logical_block_size),
            probed_size: u64::from(space_size) * u64::from(logical_block_size),
            ..ScanResult::default()
        };

        if let Some(joliet) = &joliet {
            let units: Vec<u16> = joliet
                .volume_id
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();

            if let Ok(label) = String::from_utf16(&units) {
                res.label = Some(label.trim_end_matches(' ').to_owned());
            }
        }

        if res.label.is_none() {
            let label = String::from_utf8_lossy(&pvd.volume_id);
            res.label = Some(label.trim_end_matches(' ').to_owned());
        }

        Ok(Some(res))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diskio::MemIo;

    fn descriptor(vd_type: u8) -> VolumeDescriptor {
        let mut vd =
            VolumeDescriptor::read_from_bytes(&[0u8; core::mem::size_of::<VolumeDescriptor>()])
                .unwrap();

        vd.vd_type = vd_type;
        vd.vd_id = *b"CD001";
        vd.vd_version = 1;
        vd.volume_id = [b' '; 32];

        vd
    }

    pub(crate) fn sample_image(with_joliet: bool) -> Vec<u8> {
        let blocks: u16 = 0x2AF; // 687 blocks of 2 KiB
        let mut image = vec![0u8; 0x8000 + 2048 * 4];

        let mut pvd = descriptor(VD_PRIMARY);
        pvd.volume_id[..9].copy_from_slice(b"ISO label");
        pvd.space_size[..2].copy_from_slice(&blocks.to_le_bytes());
        pvd.space_size[2..4].copy_from_slice(&blocks.to_be_bytes());
        pvd.logical_block_size[..2].copy_from_slice(&2048u16.to_le_bytes());
        pvd.logical_block_size[2..4].copy_from_slice(&2048u16.to_be_bytes());

        image[0x8000..0x8000 + core::mem::size_of::<VolumeDescriptor>()]
            .copy_from_slice(pvd.as_bytes());

        let mut next = 0x8000 + 2048;

        if with_joliet {
            let mut svd = descriptor(VD_SUPPLEMENTARY);
            svd.escape_sequences[..3].copy_from_slice(&[0x25, 0x2F, 0x45]);
            svd.logical_block_size = pvd.logical_block_size;
            svd.space_size = pvd.space_size;

            for (i, unit) in "ISO label".encode_utf16().enumerate() {
                svd.volume_id[i * 2..i * 2 + 2].copy_from_slice(&unit.to_be_bytes());
            }
            for slot in svd.volume_id[18..].chunks_exact_mut(2) {
                slot.copy_from_slice(&(b' ' as u16).to_be_bytes());
            }

            image[next..next + core::mem::size_of::<VolumeDescriptor>()]
                .copy_from_slice(svd.as_bytes());
            next += 2048;
        }

        image[next] = VD_END;
        image[next + 1..next + 6].copy_from_slice(b"CD001");

        image
    }

    #[test]
    fn primary_descriptor_only() {
        let image = sample_image(false);
        let len = image.len() as u64;
        let io = MemIo::new(image);
        let r = ProbeReader::new(&io, 0, len, 2048);

        let res = Probe.probe(&r, &MAGICS[0]).unwrap().unwrap();

        assert_eq!(res.block_size, 2048);
        assert_eq!(res.probed_size, 0x2AF * 2048);
        assert_eq!(res.label.as_deref(), Some("ISO label"));
    }

    #[test]
    fn joliet_label_wins() {
        let image = sample_image(true);
        let len = image.len() as u64;
        let io = MemIo::new(image);
        let r = ProbeReader::new(&io, 0, len, 2048);

        let res = Probe.probe(&r, &MAGICS[0]).unwrap().unwrap();
        assert_eq!(res.label.as_deref(), Some("ISO label"));
    }

    #[test]
    fn missing_primary_is_rejected() {
        let mut image = sample_image(false);
        // downgrade the PVD to a boot record
        image[0x8000] = VD_BOOT_RECORD;

        let len = image.len() as u64;
        let io = MemIo::new(image);
        let r = ProbeReader::new(&io, 0, len, 2048);

        assert!(Probe.probe(&r, &MAGICS[0]).unwrap().is_none());
    }
}
