// SPDX-License-Identifier: MIT

//! GPT partition-table prober.
//!
//! Runs on the NULL magic: the decision is made by the fully validated
//! header read shared with the partitioning engine. The backup copy is
//! consulted only when the primary fails validation.

use std::io;

use diskpart::structs;
use diskpart::util::{guid_to_uuid, last_lba};
use uuid::Uuid;

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanPartition, ScanResult};

static MAGICS: [Magic; 1] = [Magic::NULL];

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "gpt"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let sector_size = r.sector_size();

        let Some(last_lba) = last_lba(r.size(), sector_size) else {
            return Ok(None);
        };

        let found = match structs::read_header(r, 1, last_lba, sector_size)? {
            Some(found) => Some(found),
            None => structs::read_header(r, last_lba, last_lba, sector_size)?,
        };

        let Some((hdr, entries)) = found else {
            return Ok(None);
        };

        let first_usable = hdr.first_usable_lba.get();
        let last_usable = hdr.last_usable_lba.get();

        let mut res = ScanResult {
            uuid: Some(Uuid::from_bytes(guid_to_uuid(hdr.disk_guid))),
            block_size: sector_size as u32,
            probed_size: sector_size * (last_usable - first_usable + 1),
            ..ScanResult::default()
        };

        for (idx, entry) in entries.iter().enumerate() {
            let index = idx as u32 + 1;

            if entry.is_empty() {
                continue;
            }

            let starting_lba = entry.starting_lba.get();
            let ending_lba = entry.ending_lba.get();

            if starting_lba < first_usable || ending_lba > last_usable {
                continue;
            }

            res.parts.push(ScanPartition {
                uuid: Some(Uuid::from_bytes(guid_to_uuid(entry.unique_partition_guid))),
                type_uuid: Some(Uuid::from_bytes(guid_to_uuid(entry.partition_type_guid))),
                label: Some(structs::decode_name(&entry.partition_name)),

                index,

                offset: starting_lba * sector_size,
                size: (ending_lba - starting_lba + 1) * sector_size,
            });
        }

        Ok(Some(res))
    }
}
