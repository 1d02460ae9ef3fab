// SPDX-License-Identifier: MIT

//! Linux implementation of the facade: ioctls, sysfs, locks.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Device, DeviceProperties, Error, Result, DEFAULT_BLOCK_SIZE};

mod ioctls {
    use nix::{ioctl_read, ioctl_read_bad, request_code_none};

    ioctl_read!(blkgetsize64, 0x12, 114, libc::size_t);
    ioctl_read_bad!(blksszget, request_code_none!(0x12, 104), libc::c_int);
    ioctl_read_bad!(blkiomin, request_code_none!(0x12, 120), libc::c_uint);
    ioctl_read_bad!(blkioopt, request_code_none!(0x12, 121), libc::c_uint);
    ioctl_read!(blkbszget, 0x12, 112, libc::size_t);
    ioctl_read_bad!(blkroget, request_code_none!(0x12, 94), libc::c_int);
}

// linux/cdrom.h
const CDROM_GET_CAPABILITY: libc::c_ulong = 0x5331;
const CDROM_DRIVE_STATUS: libc::c_ulong = 0x5326;

impl Device {
    pub(crate) fn open(path: &Path, write: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(write)
            .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
            .open(path)?;

        Ok(Self {
            file: Arc::new(file),
            dev_no: std::sync::OnceLock::new(),
        })
    }

    /// Device size in bytes, from the BLKGETSIZE64 ioctl.
    pub fn size(&self) -> Result<u64> {
        let mut size: libc::size_t = 0;

        unsafe { ioctls::blkgetsize64(self.file.as_raw_fd(), &mut size) }
            .map_err(io::Error::from)?;

        Ok(size as u64)
    }

    /// Logical sector size in bytes; 512 when the ioctl fails.
    pub fn sector_size(&self) -> u64 {
        let mut size: libc::c_int = 0;

        match unsafe { ioctls::blksszget(self.file.as_raw_fd(), &mut size) } {
            Ok(_) if size > 0 => size as u64,
            _ => DEFAULT_BLOCK_SIZE,
        }
    }

    /// Preferred I/O size in bytes.
    ///
    /// Tries the optimal, minimum, and block-size ioctls in order and
    /// returns the first positive power of two; 512 when none qualifies.
    pub fn io_size(&self) -> u64 {
        let fd = self.file.as_raw_fd();

        let mut opt: libc::c_uint = 0;
        if unsafe { ioctls::blkioopt(fd, &mut opt) }.is_ok() && is_power_of_two(opt as u64) {
            return opt as u64;
        }

        let mut min: libc::c_uint = 0;
        if unsafe { ioctls::blkiomin(fd, &mut min) }.is_ok() && is_power_of_two(min as u64) {
            return min as u64;
        }

        let mut bsz: libc::size_t = 0;
        if unsafe { ioctls::blkbszget(fd, &mut bsz) }.is_ok() && is_power_of_two(bsz as u64) {
            return bsz as u64;
        }

        DEFAULT_BLOCK_SIZE
    }

    /// True when the device advertises CD-ROM capabilities.
    pub fn is_cd(&self) -> bool {
        (unsafe { libc::ioctl(self.file.as_raw_fd(), CDROM_GET_CAPABILITY, 0) }) >= 0
    }

    /// True when the CD-ROM drive reports no disc or an open tray.
    pub fn is_cd_no_media(&self) -> bool {
        const CDS_NO_DISC: libc::c_int = 1;
        const CDS_TRAY_OPEN: libc::c_int = 2;

        let status = unsafe { libc::ioctl(self.file.as_raw_fd(), CDROM_DRIVE_STATUS, 0) };

        status == CDS_NO_DISC || status == CDS_TRAY_OPEN
    }

    /// Device number from fstat, cached.
    pub fn dev_no(&self) -> Result<u64> {
        if let Some(&dev_no) = self.dev_no.get() {
            return Ok(dev_no);
        }

        let dev_no = std::os::unix::fs::MetadataExt::rdev(&self.file.metadata()?);

        Ok(*self.dev_no.get_or_init(|| dev_no))
    }

    /// `/sys/dev/block/<major>:<minor>` for this device.
    pub fn sysfs_path(&self) -> Result<PathBuf> {
        let dev_no = self.dev_no()?;

        let major = nix::sys::stat::major(dev_no);
        let minor = nix::sys::stat::minor(dev_no);

        Ok(PathBuf::from(format!("/sys/dev/block/{major}:{minor}")))
    }

    /// True when the device is read-only, per sysfs `ro` (falling back to
    /// the BLKROGET ioctl).
    pub fn is_read_only(&self) -> Result<bool> {
        let sysfs_path = self.sysfs_path()?;

        match std::fs::read(sysfs_path.join("ro")) {
            Ok(contents) if !contents.is_empty() => return Ok(contents[0] == b'1'),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut flags: libc::c_int = 0;
        unsafe { ioctls::blkroget(self.file.as_raw_fd(), &mut flags) }
            .map_err(io::Error::from)?;

        Ok(flags != 0)
    }

    /// True when the device represents a whole disk rather than a
    /// partition.
    pub fn is_whole_disk(&self) -> Result<bool> {
        let sysfs_path = self.sysfs_path()?;

        if sysfs_path.join("partition").exists() {
            return Ok(false);
        }

        match std::fs::read(sysfs_path.join("dm").join("uuid")) {
            // a device-mapper device is "whole" unless it is a partition
            Ok(contents) => Ok(!contents.starts_with(b"part-")),
            Err(_) => Ok(true),
        }
    }

    /// Resolves the whole disk this device belongs to.
    ///
    /// Partitions resolve to their parent; device-mapper partitions follow
    /// the first `slaves/` entry; a whole disk returns a shared clone of
    /// itself.
    pub fn whole_disk(&self) -> Result<Device> {
        let sysfs_path = self.sysfs_path()?;

        if sysfs_path.join("partition").exists() {
            let target = std::fs::read_link(&sysfs_path)?;

            let parent = target
                .parent()
                .and_then(Path::file_name)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "cannot resolve parent device")
                })?;

            return Self::open(&Path::new("/dev").join(parent), false);
        }

        let dm_uuid = match std::fs::read(sysfs_path.join("dm").join("uuid")) {
            Ok(contents) => contents,
            // not device-mapper
            Err(_) => return Ok(self.clone()),
        };

        if !dm_uuid.starts_with(b"part-") {
            // device-mapper, but not a partition
            return Ok(self.clone());
        }

        let mut slaves = std::fs::read_dir(sysfs_path.join("slaves"))?
            .collect::<io::Result<Vec<_>>>()?;
        slaves.sort_by_key(|entry| entry.file_name());

        let first = slaves.first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "device-mapper target has no slaves")
        })?;

        Self::open(&Path::new("/dev").join(first.file_name()), false)
    }

    /// True for internal LVM device-mapper constructs, whose sysfs
    /// `dm/uuid` matches `LVM-<uuid>-<name>`.
    pub fn is_private_device_mapper(&self) -> Result<bool> {
        let sysfs_path = self.sysfs_path()?;

        let contents = match std::fs::read(sysfs_path.join("dm").join("uuid")) {
            Ok(contents) => contents,
            Err(_) => return Ok(false),
        };

        let mut parts = contents.splitn(3, |&b| b == b'-');

        let prefix = parts.next();
        let middle = parts.next();
        let rest = parts.next();

        Ok(prefix == Some(b"LVM") && middle.is_some() && rest.is_some())
    }

    /// Takes the advisory lock, blocking until it is granted.
    pub fn lock(&self, exclusive: bool) -> Result {
        flock_retry(
            self.file.as_raw_fd(),
            if exclusive { libc::LOCK_EX } else { libc::LOCK_SH },
        )
        .map_err(Error::from)
    }

    /// Attempts the advisory lock without blocking; [`Error::Busy`] when
    /// another process holds a conflicting lock.
    pub fn try_lock(&self, exclusive: bool) -> Result {
        let op = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };

        flock_retry(self.file.as_raw_fd(), op | libc::LOCK_NB).map_err(|err| {
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Error::Busy
            } else {
                err.into()
            }
        })
    }

    /// Releases any held advisory lock.
    pub fn unlock(&self) -> Result {
        flock_retry(self.file.as_raw_fd(), libc::LOCK_UN).map_err(Error::from)
    }

    /// Collects device properties from sysfs.
    pub fn properties(&self) -> Result<DeviceProperties> {
        let sysfs_path = self.sysfs_path()?;

        let mut props = DeviceProperties {
            model: read_sysfs_file(&sysfs_path.join("device").join("model")),
            serial: read_sysfs_file(&sysfs_path.join("device").join("serial")),
            modalias: read_sysfs_file(&sysfs_path.join("device").join("modalias")),
            wwid: read_sysfs_file(&sysfs_path.join("wwid")),
            ..DeviceProperties::default()
        };

        if props.wwid.is_empty() {
            props.wwid = read_sysfs_file(&sysfs_path.join("device").join("wwid"));
        }

        if let Ok(full_path) = std::fs::read_link(&sysfs_path) {
            if let Some(name) = full_path.file_name() {
                props.device_name = name.to_string_lossy().into_owned();
            }

            let trimmed = full_path
                .to_string_lossy()
                .trim_start_matches("../../devices")
                .to_owned();

            if let Some(parent) = Path::new(&trimmed).parent().and_then(Path::parent) {
                props.bus_path = parent.to_string_lossy().into_owned();
            }
        }

        props.rotational = read_sysfs_file(&sysfs_path.join("queue").join("rotational")) == "1";

        if let Ok(subsystem) = std::fs::canonicalize(sysfs_path.join("subsystem")) {
            props.sub_system = subsystem.to_string_lossy().into_owned();
        }

        props.transport = transport(&sysfs_path, &props.device_name);

        Ok(props)
    }
}

/// flock with transparent EINTR retry.
fn flock_retry(fd: std::os::fd::RawFd, op: libc::c_int) -> io::Result<()> {
    loop {
        if unsafe { libc::flock(fd, op) } == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

fn is_power_of_two(v: u64) -> bool {
    v != 0 && v & (v - 1) == 0
}

fn read_sysfs_file(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_owned())
        .unwrap_or_default()
}

/// Transport of a device, derived from its name prefix and, for SCSI,
/// from the host's class and `proc_name`.
fn transport(sysfs_path: &Path, device_name: &str) -> String {
    match device_name {
        name if name.starts_with("nvme") => return "nvme".to_owned(),
        name if name.starts_with("vd") => return "virtio".to_owned(),
        name if name.starts_with("mmcblk") => return "mmc".to_owned(),
        _ => {}
    }

    let Ok(device_path) = std::fs::read_link(sysfs_path.join("device")) else {
        return String::new();
    };

    let device_path = device_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some((host, _)) = device_path.split_once(':') else {
        return String::new();
    };

    let Ok(host) = host.parse::<u32>() else {
        return String::new();
    };

    if is_scsi_host(host, "sas") {
        return "sas".to_owned();
    }

    if is_scsi_host(host, "fc") {
        return "fc".to_owned();
    }

    if scsi_has_attribute(&device_path, "ieee1394_id") {
        return "ibp".to_owned();
    }

    if is_scsi_host(host, "iscsi") {
        return "iscsi".to_owned();
    }

    if scsi_path_contains(&device_path, "usb") {
        return "usb".to_owned();
    }

    if is_scsi_host(host, "scsi") {
        let proc_name = read_scsi_host_attribute(host, "scsi", "proc_name");

        return match proc_name.as_str() {
            "ahci" | "sata" => "sata".to_owned(),
            "virtio_scsi" => "virtio".to_owned(),
            name if name.contains("ata") => "ata".to_owned(),
            _ => String::new(),
        };
    }

    String::new()
}

fn is_scsi_host(host: u32, typ: &str) -> bool {
    Path::new("/sys/class")
        .join(format!("{typ}_host"))
        .join(format!("host{host}"))
        .is_dir()
}

fn read_scsi_host_attribute(host: u32, typ: &str, attr: &str) -> String {
    read_sysfs_file(
        &Path::new("/sys/class")
            .join(format!("{typ}_host"))
            .join(format!("host{host}"))
            .join(attr),
    )
}

fn scsi_has_attribute(device_path: &str, attribute: &str) -> bool {
    Path::new("/sys/bus/scsi/devices")
        .join(device_path)
        .join(attribute)
        .exists()
}

fn scsi_path_contains(device_path: &str, what: &str) -> bool {
    std::fs::read_link(Path::new("/sys/bus/scsi/devices").join(device_path))
        .map(|dest| dest.to_string_lossy().contains(what))
        .unwrap_or(false)
}
