// SPDX-License-Identifier: MIT

//! Magic-driven probing of block devices and disk images.
//!
//! [`probe_path`]/[`probe_file`] classify the contents of a device as a
//! filesystem, volume manager or partition table, and recursively probe
//! inside discovered partitions. Detection runs through an ordered
//! [`chain::Chain`] of probers, pre-selected by magic values and confirmed
//! by reading the candidate's superblock or header.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use diskio::ReadAt;
use uuid::Uuid;

pub mod chain;
mod display;
pub mod fs;
pub mod magic;
pub mod part;
pub mod probe;
pub mod utils;

use chain::Chain;
use probe::{ProbeReader, ScanPartition, ScanResult};

/// Probing errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Block(#[from] diskblock::Error),

    /// Another process holds an exclusive lock on the whole disk.
    #[error("failed to acquire shared lock while probing blockdevice")]
    FailedLock,

    #[error("probing range is out of bounds: offset {offset} + length {length} > size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("probing range is too small: length {length} < max magic size {max_magic_size}")]
    RangeTooSmall { length: u64, max_magic_size: u64 },

    /// Neither a block device nor a regular file.
    #[error("unsupported file type")]
    UnsupportedFileType,
}

pub type Result<T = ()> = std::result::Result<T, Error>;

/// Options for probing.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    skip_locking: bool,
}

impl ProbeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not take the whole disk's shared advisory lock while probing.
    pub fn skip_locking(mut self) -> Self {
        self.skip_locking = true;
        self
    }
}

/// Result of probing a single layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Format identifier, e.g. `xfs`, `gpt`.
    pub name: &'static str,

    pub uuid: Option<Uuid>,
    pub label: Option<String>,

    pub block_size: u32,
    pub filesystem_block_size: u32,
    pub probed_size: u64,
}

impl ProbeResult {
    fn from_scan(name: &'static str, scan: &ScanResult) -> Self {
        Self {
            name,
            uuid: scan.uuid,
            label: scan.label.clone(),
            block_size: scan.block_size,
            filesystem_block_size: scan.filesystem_block_size,
            probed_size: scan.probed_size,
        }
    }
}

/// Probe result for one partition of an outer partition table, possibly
/// carrying further nested results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedProbeResult {
    pub partition_uuid: Option<Uuid>,
    pub partition_type: Option<Uuid>,
    pub partition_label: Option<String>,

    /// 1-based entry position in the outer table.
    pub partition_index: u32,

    /// Byte range, absolute within the outer range.
    pub partition_offset: u64,
    pub partition_size: u64,

    /// What was found inside the partition, if anything.
    pub probe_result: Option<ProbeResult>,

    pub parts: Vec<NestedProbeResult>,
}

/// Top-level probe output: device metadata plus the (possibly nested)
/// probe results.
#[derive(Debug)]
pub struct Info {
    /// Facade handle, only when the probed file is a block device.
    pub block_device: Option<diskblock::Device>,

    /// Device number, only for block devices.
    pub dev_no: Option<u64>,

    /// True when the probed device is a whole disk.
    pub whole_disk: bool,

    /// Overall size in bytes.
    pub size: u64,

    /// Sector size in bytes.
    pub sector_size: u64,

    /// Optimal I/O size in bytes.
    pub io_size: u64,

    /// What was found at the top level, if anything.
    pub probe_result: Option<ProbeResult>,

    /// Nested results for each discovered partition.
    pub parts: Vec<NestedProbeResult>,
}

/// Probes the device or image at `path`.
pub fn probe_path(path: impl AsRef<Path>, options: ProbeOptions) -> Result<Info> {
    let file = open_probe_file(path.as_ref())?;

    probe_file(file, options)
}

/// Probes an already-open device or image file.
pub fn probe_file(file: File, options: ProbeOptions) -> Result<Info> {
    fadvise_random(&file);

    let meta = file.metadata()?;

    let mut info;
    let reader: Arc<File>;

    if is_block_device(&meta) {
        let dev = diskblock::Device::from_file(file);

        let size = dev.size()?;
        let sector_size = dev.sector_size();
        let io_size = dev.io_size();
        let dev_no = dev.dev_no()?;
        let whole_disk = dev.is_whole_disk().unwrap_or(false);

        reader = dev.shared_file();

        info = Info {
            block_device: Some(dev),
            dev_no: Some(dev_no),
            whole_disk,
            size,
            sector_size,
            io_size,
            probe_result: None,
            parts: Vec::new(),
        };
    } else if meta.is_file() {
        info = Info {
            block_device: None,
            dev_no: None,
            whole_disk: false,
            size: meta.len(),
            sector_size: diskblock::DEFAULT_BLOCK_SIZE,
            io_size: diskblock::DEFAULT_BLOCK_SIZE,
            probe_result: None,
            parts: Vec::new(),
        };

        reader = Arc::new(file);
    } else {
        return Err(Error::UnsupportedFileType);
    }

    if let Some(dev) = &info.block_device {
        if dev.is_private_device_mapper().unwrap_or(false) {
            log::debug!("not probing private device-mapper device");

            return Ok(info);
        }

        if info.whole_disk && dev.is_cd() && dev.is_cd_no_media() {
            log::debug!("not probing CD drive without media");

            return Ok(info);
        }
    }

    let locked = match &info.block_device {
        Some(dev) if !options.skip_locking => {
            let whole = dev.whole_disk()?;

            match whole.try_lock(false) {
                Ok(()) => Some(whole),
                Err(diskblock::Error::Busy) => return Err(Error::FailedLock),
                Err(err) => return Err(err.into()),
            }
        }
        _ => None,
    };

    let filled = fill_probe_result(&mut info, reader.as_ref());

    if let Some(whole) = locked {
        let _ = whole.unlock();
    }

    filled?;

    Ok(info)
}

/// Device geometry threaded through the recursive probe.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    size: u64,
    sector_size: u64,
    io_size: u64,
}

fn fill_probe_result(info: &mut Info, reader: &File) -> Result {
    let chain = Chain::default();

    let geometry = Geometry {
        size: info.size,
        sector_size: info.sector_size,
        io_size: info.io_size,
    };

    let Some((scan, name)) = probe_range(reader, &chain, 0, geometry.size, geometry)? else {
        return Ok(());
    };

    info.probe_result = Some(ProbeResult::from_scan(name, &scan));
    info.parts = fill_nested(reader, &chain, 0, &scan.parts, geometry)?;

    Ok(())
}

fn fill_nested(
    reader: &File,
    chain: &Chain,
    offset: u64,
    parts: &[ScanPartition],
    geometry: Geometry,
) -> Result<Vec<NestedProbeResult>> {
    let mut out = Vec::with_capacity(parts.len());

    for part in parts {
        let mut nested = NestedProbeResult {
            partition_uuid: part.uuid,
            partition_type: part.type_uuid,
            partition_label: part.label.clone(),
            partition_index: part.index,
            partition_offset: part.offset,
            partition_size: part.size,
            probe_result: None,
            parts: Vec::new(),
        };

        if let Some((scan, name)) =
            probe_range(reader, chain, offset + part.offset, part.size, geometry)?
        {
            nested.probe_result = Some(ProbeResult::from_scan(name, &scan));
            nested.parts =
                fill_nested(reader, chain, offset + part.offset, &scan.parts, geometry)?;
        }

        out.push(nested);
    }

    Ok(out)
}

/// Runs the chain over one byte range; the first prober to confirm wins.
fn probe_range(
    reader: &File,
    chain: &Chain,
    offset: u64,
    length: u64,
    geometry: Geometry,
) -> Result<Option<(ScanResult, &'static str)>> {
    if offset + length > geometry.size {
        return Err(Error::OutOfBounds {
            offset,
            length,
            size: geometry.size,
        });
    }

    let max_magic_size = chain.max_magic_size() as u64;

    if length < max_magic_size {
        return Err(Error::RangeTooSmall {
            length,
            max_magic_size,
        });
    }

    // one read covers every anchored magic in the chain
    let magic_read_size = max_magic_size.max(geometry.io_size).min(length);

    let mut buf = vec![0u8; magic_read_size as usize];
    reader.read_exact_at(&mut buf, offset)?;

    let probe_reader = ProbeReader::new(reader, offset, length, geometry.sector_size);

    for (prober, magic) in chain.matches(&buf) {
        match prober.probe(&probe_reader, magic)? {
            Some(scan) => return Ok(Some((scan, prober.name()))),
            None => log::debug!("prober {} rejected the device after magic match", prober.name()),
        }
    }

    Ok(None)
}

#[cfg(unix)]
fn is_block_device(meta: &std::fs::Metadata) -> bool {
    std::os::unix::fs::FileTypeExt::is_block_device(&meta.file_type())
}

#[cfg(not(unix))]
fn is_block_device(_meta: &std::fs::Metadata) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn open_probe_file(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_probe_file(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Best-effort read-ahead hint; probing jumps around the device.
#[cfg(target_os = "linux")]
fn fadvise_random(file: &File) {
    use std::os::fd::AsRawFd;

    unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_RANDOM) };
}

#[cfg(not(target_os = "linux"))]
fn fadvise_random(_file: &File) {}
