// SPDX-License-Identifier: MIT

//! ext2/ext3/ext4 prober.

use std::io;

use diskio::ReadAt;
use uuid::Uuid;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};
use crate::utils;

/// Superblock location within the filesystem.
pub const SUPERBLOCK_OFFSET: usize = 0x400;

const EXT4_FEATURE_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

static MAGICS: [Magic; 1] = [Magic {
    offset: SUPERBLOCK_OFFSET + 0x38,
    value: &[0x53, 0xEF],
}];

/// On-disk superblock, little-endian, 1024 bytes.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SuperBlock {
    pub s_inodes_count: U32,
    pub s_blocks_count: U32,
    pub s_r_blocks_count: U32,
    pub s_free_blocks_count: U32,
    pub s_free_inodes_count: U32,
    pub s_first_data_block: U32,
    pub s_log_block_size: U32,
    pub s_log_cluster_size: U32,
    pub s_blocks_per_group: U32,
    pub s_clusters_per_group: U32,
    pub s_inodes_per_group: U32,
    pub s_mtime: U32,
    pub s_wtime: U32,
    pub s_mnt_count: U16,
    pub s_max_mnt_count: U16,
    pub s_magic: U16,
    pub s_state: U16,
    pub s_errors: U16,
    pub s_minor_rev_level: U16,
    pub s_lastcheck: U32,
    pub s_checkinterval: U32,
    pub s_creator_os: U32,
    pub s_rev_level: U32,
    pub s_def_resuid: U16,
    pub s_def_resgid: U16,
    pub s_first_ino: U32,
    pub s_inode_size: U16,
    pub s_block_group_nr: U16,
    pub s_feature_compat: U32,
    pub s_feature_incompat: U32,
    pub s_feature_ro_compat: U32,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
    pub s_last_mounted: [u8; 64],
    pub s_algorithm_usage_bitmap: U32,
    pub s_reserved: [u8; 816],
    pub s_checksum: U32,
}

impl SuperBlock {
    /// Filesystem block size; `None` for an out-of-range shift.
    pub fn block_size(&self) -> Option<u32> {
        if self.s_log_block_size.get() >= 32 {
            return None;
        }

        Some(1024 << self.s_log_block_size.get())
    }

    pub fn filesystem_size(&self) -> u64 {
        u64::from(self.s_blocks_count.get()) * u64::from(self.block_size().unwrap_or(0))
    }
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "extfs"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let mut buf = [0u8; core::mem::size_of::<SuperBlock>()];
        r.read_exact_at(&mut buf, SUPERBLOCK_OFFSET as u64)?;

        let sb = SuperBlock::read_from_bytes(&buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "superblock decode failed"))?;

        if sb.s_feature_ro_compat.get() & EXT4_FEATURE_RO_COMPAT_METADATA_CSUM != 0
            && utils::crc32c(&buf[..1020]) != sb.s_checksum.get()
        {
            return Ok(None);
        }

        let Some(block_size) = sb.block_size() else {
            return Ok(None);
        };

        let mut res = ScanResult {
            uuid: Some(Uuid::from_bytes(sb.s_uuid)),
            block_size,
            filesystem_block_size: block_size,
            probed_size: sb.filesystem_size(),
            ..ScanResult::default()
        };

        if sb.s_volume_name[0] != 0 {
            let end = sb
                .s_volume_name
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(sb.s_volume_name.len());

            res.label = Some(String::from_utf8_lossy(&sb.s_volume_name[..end]).into_owned());
        }

        Ok(Some(res))
    }
}
