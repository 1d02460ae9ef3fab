// SPDX-License-Identifier: MIT

//! LVM2 physical-volume prober.

use std::io;

use diskio::ReadStructAt;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

static MAGICS: [Magic; 2] = [
    Magic {
        offset: 0x018,
        value: b"LVM2 001",
    },
    Magic {
        offset: 0x218,
        value: b"LVM2 001",
    },
];

/// Label header plus the PV identifier, found in sector 0 or 1.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct PvHeader {
    pub id: [u8; 8],
    pub sector_xl: U64,
    pub crc_xl: U32,
    pub offset_xl: U32,
    pub type_: [u8; 8],
    pub pv_uuid: [u8; 32],
}

pub struct Probe;

impl Probe {
    fn read_header(r: &ProbeReader<'_>, offset: u64) -> io::Result<Option<PvHeader>> {
        let hdr: PvHeader = r.read_struct_at(offset)?;

        if &hdr.id != b"LABELONE" || &hdr.type_ != b"LVM2 001" {
            return Ok(None);
        }

        Ok(Some(hdr))
    }
}

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "lvm2-pv"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let hdr = match Self::read_header(r, 0)? {
            Some(hdr) => hdr,
            None => match Self::read_header(r, 512)? {
                Some(hdr) => hdr,
                None => return Ok(None),
            },
        };

        // the PV identifier is 32 ASCII characters, not a 128-bit UUID,
        // so it is surfaced as a label in 6-4-4-4-4-4-6 grouping
        let id = String::from_utf8_lossy(&hdr.pv_uuid);

        let groups = [
            &id[..6],
            &id[6..10],
            &id[10..14],
            &id[14..18],
            &id[18..22],
            &id[22..26],
            &id[26..],
        ];

        Ok(Some(ScanResult {
            label: Some(groups.join("-")),
            ..ScanResult::default()
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diskio::MemIo;

    pub(crate) fn sample_image(size: usize, at_second_sector: bool) -> Vec<u8> {
        let mut image = vec![0u8; size];

        let mut hdr = PvHeader::read_from_bytes(&[0u8; core::mem::size_of::<PvHeader>()]).unwrap();
        hdr.id = *b"LABELONE";
        hdr.sector_xl = U64::new(u64::from(at_second_sector));
        hdr.type_ = *b"LVM2 001";
        hdr.pv_uuid = *b"2v8zPBcIqqkfLdSyKuZQbK3QJdoUqz3d";

        let offset = if at_second_sector { 512 } else { 0 };
        image[offset..offset + core::mem::size_of::<PvHeader>()].copy_from_slice(hdr.as_bytes());

        image
    }

    #[test]
    fn label_is_grouped_pv_id() {
        let size = 4 * 1024 * 1024;
        let io = MemIo::new(sample_image(size, true));
        let r = ProbeReader::new(&io, 0, size as u64, 512);

        let res = Probe.probe(&r, &MAGICS[1]).unwrap().unwrap();

        assert_eq!(
            res.label.as_deref(),
            Some("2v8zPB-cIqq-kfLd-SyKu-ZQbK-3QJd-oUqz3d")
        );
        assert_eq!(res.uuid, None);
    }

    #[test]
    fn missing_labelone_is_rejected() {
        let size = 1024 * 1024;
        let mut image = sample_image(size, false);
        image[..8].copy_from_slice(b"NOTLABEL");

        let io = MemIo::new(image);
        let r = ProbeReader::new(&io, 0, size as u64, 512);

        assert!(Probe.probe(&r, &MAGICS[0]).unwrap().is_none());
    }
}
