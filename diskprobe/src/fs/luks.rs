// SPDX-License-Identifier: MIT

//! LUKS2 container prober and JSON metadata reader.
//!
//! Only the version-2 header format is recognized. The binary header is
//! followed (at 4 KiB) by a JSON document describing keyslots and tokens;
//! [`read_metadata`] decodes it without touching any key material.

use std::collections::BTreeMap;
use std::io;

use diskio::{ReadAt, ReadStructAt};
use serde::Deserialize;
use uuid::Uuid;
use zerocopy::big_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

static MAGICS: [Magic; 1] = [Magic {
    offset: 0,
    value: b"LUKS\xba\xbe",
}];

/// Size of the binary header; the JSON area follows.
pub const BIN_HEADER_SIZE: u64 = 4096;

/// LUKS2 on-disk header, big-endian.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Luks2Header {
    pub magic: [u8; 6],
    pub version: U16,
    /// Header size in bytes, including the JSON area.
    pub hdr_size: U64,
    pub seqid: U64,
    pub label: [u8; 48],
    pub checksum_alg: [u8; 32],
    pub salt: [u8; 64],
    /// ASCII UUID string.
    pub uuid: [u8; 40],
    pub subsystem: [u8; 48],
    pub hdr_offset: U64,
    pub padding: [u8; 184],
    pub csum: [u8; 64],
}

fn nul_trimmed(field: &[u8]) -> Option<&[u8]> {
    if field[0] == 0 {
        return None;
    }

    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());

    Some(&field[..end])
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "luks"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let hdr: Luks2Header = r.read_struct_at(0)?;

        if hdr.version.get() != 2 {
            return Ok(None);
        }

        let mut res = ScanResult::default();

        if let Some(label) = nul_trimmed(&hdr.label) {
            res.label = Some(String::from_utf8_lossy(label).into_owned());
        }

        if let Some(uuid) = nul_trimmed(&hdr.uuid) {
            res.uuid = std::str::from_utf8(uuid)
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok());
        }

        Ok(Some(res))
    }
}

/// A single keyslot descriptor from the JSON area.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Keyslot {
    #[serde(rename = "type")]
    pub slot_type: String,
    pub key_size: u32,

    /// Remaining per-slot fields (af, area, kdf, ...), kept as raw JSON.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Decoded LUKS2 JSON metadata: keyslots by their numeric-string ID, plus
/// token presence. Token manipulation is out of scope here.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Metadata {
    pub keyslots: BTreeMap<String, Keyslot>,

    #[serde(default)]
    pub tokens: BTreeMap<String, serde_json::Value>,
}

/// Reads the JSON metadata area of a LUKS2 container.
///
/// Returns `Ok(None)` when the range does not carry a LUKS2 header.
pub fn read_metadata<R: ReadAt + ?Sized>(r: &R) -> io::Result<Option<Metadata>> {
    let hdr: Luks2Header = r.read_struct_at(0)?;

    if hdr.magic[..] != *MAGICS[0].value || hdr.version.get() != 2 {
        return Ok(None);
    }

    let json_len = hdr
        .hdr_size
        .get()
        .checked_sub(BIN_HEADER_SIZE)
        .filter(|&len| len > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "LUKS2 header size too small"))?;

    let mut buf = vec![0u8; json_len as usize];
    r.read_exact_at(&mut buf, BIN_HEADER_SIZE)?;

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());

    let metadata = serde_json::from_slice(&buf[..end])
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    Ok(Some(metadata))
}
