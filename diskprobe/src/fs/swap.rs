// SPDX-License-Identifier: MIT

//! Linux swapspace prober.
//!
//! The page size is not stored in the header; it is inferred from which
//! offset the magic was found at (the magic sits in the last 10 bytes of
//! the first page).

use std::io;

use diskio::ReadStructAt;
use uuid::Uuid;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

const HEADER_OFFSET: u64 = 1024;

static MAGICS: [Magic; 10] = [
    Magic {
        offset: 0xFF6,
        value: b"SWAP-SPACE",
    },
    Magic {
        offset: 0xFF6,
        value: b"SWAPSPACE2",
    },
    Magic {
        offset: 0x1FF6,
        value: b"SWAP-SPACE",
    },
    Magic {
        offset: 0x1FF6,
        value: b"SWAPSPACE2",
    },
    Magic {
        offset: 0x3FF6,
        value: b"SWAP-SPACE",
    },
    Magic {
        offset: 0x3FF6,
        value: b"SWAPSPACE2",
    },
    Magic {
        offset: 0x7FF6,
        value: b"SWAP-SPACE",
    },
    Magic {
        offset: 0x7FF6,
        value: b"SWAPSPACE2",
    },
    Magic {
        offset: 0xFFF6,
        value: b"SWAP-SPACE",
    },
    Magic {
        offset: 0xFFF6,
        value: b"SWAPSPACE2",
    },
];

/// Swap header at offset 1024, little-endian.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SwapHeader {
    pub version: U32,
    pub last_page: U32,
    pub nr_badpages: U32,
    pub uuid: [u8; 16],
    pub volume: [u8; 16],
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, magic: &Magic) -> io::Result<Option<ScanResult>> {
        let hdr: SwapHeader = r.read_struct_at(HEADER_OFFSET)?;

        if hdr.version.get() != 1 || hdr.last_page.get() == 0 {
            return Ok(None);
        }

        let page_size = magic.block_size() as u64;

        let mut res = ScanResult {
            uuid: Some(Uuid::from_bytes(hdr.uuid)),
            block_size: page_size as u32,
            filesystem_block_size: page_size as u32,
            probed_size: page_size * u64::from(hdr.last_page.get()),
            ..ScanResult::default()
        };

        if hdr.volume[0] != 0 {
            let end = hdr
                .volume
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(hdr.volume.len());

            res.label = Some(String::from_utf8_lossy(&hdr.volume[..end]).into_owned());
        }

        Ok(Some(res))
    }
}
