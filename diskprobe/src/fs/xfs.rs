// SPDX-License-Identifier: MIT

//! XFS prober.

use std::io;

use diskio::ReadStructAt;
use uuid::Uuid;
use zerocopy::big_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

static MAGICS: [Magic; 1] = [Magic {
    offset: 0,
    value: b"XFSB",
}];

// geometry limits from the XFS on-disk format
const XFS_MIN_BLOCKSIZE_LOG: u8 = 9;
const XFS_MAX_BLOCKSIZE_LOG: u8 = 16;
const XFS_MIN_SECTORSIZE_LOG: u8 = 9;
const XFS_MAX_SECTORSIZE_LOG: u8 = 15;
const XFS_DINODE_MIN_LOG: u8 = 8;
const XFS_DINODE_MAX_LOG: u8 = 11;
const XFS_MAX_RTEXTSIZE: u64 = 1024 * 1024 * 1024;
const XFS_MIN_RTEXTSIZE: u64 = 4 * 1024;

/// On-disk superblock, big-endian, truncated to the fields probing needs.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SuperBlock {
    pub sb_magicnum: U32,
    pub sb_blocksize: U32,
    pub sb_dblocks: U64,
    pub sb_rblocks: U64,
    pub sb_rextents: U64,
    pub sb_uuid: [u8; 16],
    pub sb_logstart: U64,
    pub sb_rootino: U64,
    pub sb_rbmino: U64,
    pub sb_rsumino: U64,
    pub sb_rextsize: U32,
    pub sb_agblocks: U32,
    pub sb_agcount: U32,
    pub sb_rbmblocks: U32,
    pub sb_logblocks: U32,
    pub sb_versionnum: U16,
    pub sb_sectsize: U16,
    pub sb_inodesize: U16,
    pub sb_inopblock: U16,
    pub sb_fname: [u8; 12],
    pub sb_blocklog: u8,
    pub sb_sectlog: u8,
    pub sb_inodelog: u8,
    pub sb_inopblog: u8,
    pub sb_agblklog: u8,
    pub sb_rextslog: u8,
    pub sb_inprogress: u8,
    pub sb_imax_pct: u8,
    pub sb_icount: U64,
    pub sb_ifree: U64,
    pub sb_fdblocks: U64,
    pub sb_frextents: U64,
}

impl SuperBlock {
    /// Geometry sanity checks, ported from the kernel's mount-time
    /// validation.
    pub fn valid(&self) -> bool {
        let sectsize = u64::from(self.sb_sectsize.get());
        let blocksize = u64::from(self.sb_blocksize.get());
        let inodesize = u64::from(self.sb_inodesize.get());
        let rext_bytes = u64::from(self.sb_rextsize.get()) * blocksize;

        self.sb_agcount.get() > 0
            && (XFS_MIN_SECTORSIZE_LOG..=XFS_MAX_SECTORSIZE_LOG).contains(&self.sb_sectlog)
            && sectsize == 1 << self.sb_sectlog
            && (XFS_MIN_BLOCKSIZE_LOG..=XFS_MAX_BLOCKSIZE_LOG).contains(&self.sb_blocklog)
            && blocksize == 1 << self.sb_blocklog
            && (XFS_DINODE_MIN_LOG..=XFS_DINODE_MAX_LOG).contains(&self.sb_inodelog)
            && inodesize == 1 << self.sb_inodelog
            && self.sb_blocklog - self.sb_inodelog == self.sb_inopblog
            && (XFS_MIN_RTEXTSIZE..=XFS_MAX_RTEXTSIZE).contains(&rext_bytes)
            && self.sb_imax_pct <= 100
            && self.sb_dblocks.get() != 0
    }

    /// Filesystem size in bytes: data blocks minus the internal log.
    pub fn filesystem_size(&self) -> u64 {
        let log_blocks = if self.sb_logstart.get() != 0 {
            u64::from(self.sb_logblocks.get())
        } else {
            0
        };

        (self.sb_dblocks.get() - log_blocks) * u64::from(self.sb_blocksize.get())
    }
}

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "xfs"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        let sb: SuperBlock = r.read_struct_at(0)?;

        if !sb.valid() {
            return Ok(None);
        }

        let mut res = ScanResult {
            uuid: Some(Uuid::from_bytes(sb.sb_uuid)),
            block_size: u32::from(sb.sb_sectsize.get()),
            filesystem_block_size: sb.sb_blocksize.get(),
            probed_size: sb.filesystem_size(),
            ..ScanResult::default()
        };

        if sb.sb_fname[0] != 0 {
            let end = sb
                .sb_fname
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(sb.sb_fname.len());

            res.label = Some(String::from_utf8_lossy(&sb.sb_fname[..end]).into_owned());
        }

        Ok(Some(res))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use zerocopy::IntoBytes as _;

    /// A minimal valid superblock mimicking mkfs.xfs on a 500 MiB image.
    pub(crate) fn sample_superblock(label: &[u8]) -> Vec<u8> {
        let mut sb = SuperBlock::read_from_bytes(&[0u8; core::mem::size_of::<SuperBlock>()])
            .unwrap();

        sb.sb_magicnum = U32::new(u32::from_be_bytes(*b"XFSB"));
        sb.sb_blocksize = U32::new(4096);
        // 436 MiB of data blocks after a 16 MiB internal log
        sb.sb_dblocks = U64::new((436 * 1024 * 1024 + 16 * 1024 * 1024) / 4096);
        sb.sb_uuid = *uuid::Uuid::new_v4().as_bytes();
        sb.sb_logstart = U64::new(4096);
        sb.sb_rextsize = U32::new(1);
        sb.sb_agcount = U32::new(4);
        sb.sb_logblocks = U32::new(16 * 1024 * 1024 / 4096);
        sb.sb_sectsize = U16::new(512);
        sb.sb_inodesize = U16::new(512);
        sb.sb_fname[..label.len()].copy_from_slice(label);
        sb.sb_blocklog = 12;
        sb.sb_sectlog = 9;
        sb.sb_inodelog = 9;
        sb.sb_inopblog = 3;
        sb.sb_imax_pct = 25;

        sb.as_bytes().to_vec()
    }

    #[test]
    fn probes_valid_superblock() {
        let image = {
            let mut buf = sample_superblock(b"somelabel");
            buf.resize(1024 * 1024, 0);
            buf
        };

        let io = diskio::MemIo::new(image);
        let r = ProbeReader::new(&io, 0, 1024 * 1024, 512);

        let res = Probe.probe(&r, &MAGICS[0]).unwrap().unwrap();

        assert_eq!(res.block_size, 512);
        assert_eq!(res.filesystem_block_size, 4096);
        assert_eq!(res.probed_size, 436 * 1024 * 1024);
        assert_eq!(res.label.as_deref(), Some("somelabel"));
        assert!(res.uuid.is_some());
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut image = sample_superblock(b"x");
        // sector size no longer matches its log2 field
        image[102..104].copy_from_slice(&1024u16.to_be_bytes());
        image.resize(1024 * 1024, 0);

        let io = diskio::MemIo::new(image);
        let r = ProbeReader::new(&io, 0, 1024 * 1024, 512);

        assert!(Probe.probe(&r, &MAGICS[0]).unwrap().is_none());
    }
}
