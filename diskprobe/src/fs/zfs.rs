// SPDX-License-Identifier: MIT

//! ZFS member-device prober.
//!
//! A vdev carries four 256 KiB label copies, two at each end. Each label
//! holds 128 uberblocks starting 128 KiB in; the device is accepted once
//! four valid uberblocks are seen, so a freshly created pool with sparse
//! uberblock rings still probes while stray magic bytes do not.

use std::io;

use diskio::ReadAt;
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

const UBERBLOCK_COUNT: u64 = 128;
const UBERBLOCK_SIZE: u64 = 1024;
const LABEL_UBERBLOCK_OFFSET: u64 = 128 * 1024;
const VDEV_LABEL_SIZE: u64 = 256 * 1024;
const MIN_UBERBLOCKS: usize = 4;
const MIN_SIZE: u64 = 64 * 1024 * 1024;

const UBERBLOCK_MAGIC: u64 = 0x0000_0000_00BA_B10C;
const UBERBLOCK_MAGIC_SWAPPED: u64 = 0x0000_0000_0CB1_BA00;

static MAGICS: [Magic; 1] = [Magic::NULL];

/// Uberblock prefix, little-endian.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, Copy)]
#[repr(C)]
pub struct Uberblock {
    pub ub_magic: U64,
    pub ub_version: U64,
    pub ub_txg: U64,
    pub ub_guid_sum: U64,
    pub ub_timestamp: U64,
}

impl Uberblock {
    fn is_valid(&self) -> bool {
        self.ub_magic.get() == UBERBLOCK_MAGIC || self.ub_magic.get() == UBERBLOCK_MAGIC_SWAPPED
    }
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "zfs"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let size = r.size();

        if size < MIN_SIZE {
            return Ok(None);
        }

        // bytes between the end of the last label and the device end
        let last_label_offset = size % VDEV_LABEL_SIZE;

        let label_offsets = [
            0,
            VDEV_LABEL_SIZE,
            size - 2 * VDEV_LABEL_SIZE - last_label_offset,
            size - VDEV_LABEL_SIZE - last_label_offset,
        ];

        let mut found = 0;
        let mut last_match: Option<Uberblock> = None;

        let mut label_buf = vec![0u8; VDEV_LABEL_SIZE as usize];

        for label_offset in label_offsets {
            r.read_exact_at(&mut label_buf, label_offset)?;

            for i in 0..UBERBLOCK_COUNT {
                let ub_offset = (LABEL_UBERBLOCK_OFFSET + i * UBERBLOCK_SIZE) as usize;

                let Ok(ub) = Uberblock::read_from_bytes(
                    &label_buf[ub_offset..ub_offset + core::mem::size_of::<Uberblock>()],
                ) else {
                    continue;
                };

                if ub.is_valid() {
                    found += 1;
                    last_match = Some(ub);
                }
            }

            if found >= MIN_UBERBLOCKS {
                break;
            }
        }

        let Some(ub) = last_match.filter(|_| found >= MIN_UBERBLOCKS) else {
            return Ok(None);
        };

        Ok(Some(ScanResult {
            label: Some(format!("{:016x}", ub.ub_guid_sum.get())),
            ..ScanResult::default()
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diskio::MemIo;

    /// 64 MiB vdev with valid uberblock rings in all four labels.
    pub(crate) fn sample_image(guid_sum: u64) -> Vec<u8> {
        let size = MIN_SIZE as usize;
        let mut image = vec![0u8; size];

        let last_label_offset = size % VDEV_LABEL_SIZE as usize;
        let labels = [
            0,
            VDEV_LABEL_SIZE as usize,
            size - 2 * VDEV_LABEL_SIZE as usize - last_label_offset,
            size - VDEV_LABEL_SIZE as usize - last_label_offset,
        ];

        let mut ub =
            Uberblock::read_from_bytes(&[0u8; core::mem::size_of::<Uberblock>()]).unwrap();
        ub.ub_magic = U64::new(UBERBLOCK_MAGIC);
        ub.ub_version = U64::new(5000);
        ub.ub_guid_sum = U64::new(guid_sum);

        for label in labels {
            for i in 0..8 {
                let offset =
                    label + LABEL_UBERBLOCK_OFFSET as usize + i * UBERBLOCK_SIZE as usize;
                image[offset..offset + core::mem::size_of::<Uberblock>()]
                    .copy_from_slice(ub.as_bytes());
            }
        }

        image
    }

    #[test]
    fn probes_vdev_labels() {
        let image = sample_image(0xDEAD_BEEF_0123_4567);
        let len = image.len() as u64;
        let io = MemIo::new(image);

        let r = ProbeReader::new(&io, 0, len, 512);
        let res = Probe.probe(&r, &Magic::NULL).unwrap().unwrap();

        assert_eq!(res.label.as_deref(), Some("deadbeef01234567"));
    }

    #[test]
    fn small_devices_are_rejected() {
        let io = MemIo::zeroed(1024 * 1024);

        let r = ProbeReader::new(&io, 0, 1024 * 1024, 512);
        assert!(Probe.probe(&r, &Magic::NULL).unwrap().is_none());
    }

    #[test]
    fn too_few_uberblocks_are_rejected() {
        let mut image = vec![0u8; MIN_SIZE as usize];

        // three valid uberblocks in the first label only
        let mut ub =
            Uberblock::read_from_bytes(&[0u8; core::mem::size_of::<Uberblock>()]).unwrap();
        ub.ub_magic = U64::new(UBERBLOCK_MAGIC);

        for i in 0..3 {
            let offset = LABEL_UBERBLOCK_OFFSET as usize + i * UBERBLOCK_SIZE as usize;
            image[offset..offset + core::mem::size_of::<Uberblock>()]
                .copy_from_slice(ub.as_bytes());
        }

        let len = image.len() as u64;
        let io = MemIo::new(image);

        let r = ProbeReader::new(&io, 0, len, 512);
        assert!(Probe.probe(&r, &Magic::NULL).unwrap().is_none());
    }
}
