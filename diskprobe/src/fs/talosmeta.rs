// SPDX-License-Identifier: MIT

//! Talos META partition prober.
//!
//! The region stores two 256 KiB copies back to back; each copy carries
//! one magic at its start and another in its last four bytes.

use std::io;

use diskio::ReadAt;

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

const MAGIC1: u32 = 0x5A4B_3C2D;
const MAGIC2: u32 = 0xA5B4_C3D2;
const LENGTH: u64 = 256 * 1024;

static MAGIC1_BYTES: [u8; 4] = MAGIC1.to_be_bytes();

static MAGICS: [Magic; 1] = [Magic {
    offset: 0,
    value: &MAGIC1_BYTES,
}];

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "talosmeta"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let mut buf = [0u8; 4];

        for offset in [0, LENGTH] {
            r.read_exact_at(&mut buf, offset)?;

            if u32::from_be_bytes(buf) != MAGIC1 {
                continue;
            }

            r.read_exact_at(&mut buf, offset + LENGTH - 4)?;

            if u32::from_be_bytes(buf) != MAGIC2 {
                continue;
            }

            return Ok(Some(ScanResult {
                probed_size: 2 * LENGTH,
                ..ScanResult::default()
            }));
        }

        Ok(None)
    }
}
