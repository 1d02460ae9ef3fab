// SPDX-License-Identifier: MIT

/// Conventional Linux device name for partition `part` of `disk`.
///
/// Disks whose name ends in a digit get a `p` separator:
/// `sda` → `sda1`, `nvme0n1` → `nvme0n1p1`, `loop0` → `loop0p1`,
/// `mmcblk0` → `mmcblk0p1`.
pub fn partition_dev_name(disk: &str, part: u32) -> String {
    let sep = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        "p"
    } else {
        ""
    };

    format!("{disk}{sep}{part}")
}
