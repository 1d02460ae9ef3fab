// SPDX-License-Identifier: MIT

//! Filesystem and volume-manager probers, one module per format.

pub mod bluestore;
pub mod ext;
pub mod iso9660;
pub mod luks;
pub mod lvm2;
pub mod squashfs;
pub mod swap;
pub mod talosmeta;
pub mod vfat;
pub mod xfs;
pub mod zfs;
