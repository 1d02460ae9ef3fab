// SPDX-License-Identifier: MIT

use std::io;

use diskio::{ReadAt, WriteAt};

const ENTRY_OFFSET: usize = 446;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Rewrites the protective entry of the MBR in sector 0.
///
/// The rest of the sector (boot code, the other three entries) is read
/// back and preserved; only bytes 446..462 and the boot signature are
/// stamped. The partition type is always set to 0xEE and the bootable flag
/// follows `bootable`, regardless of what was on disk before.
pub(crate) fn write_protective_mbr<D: ReadAt + WriteAt + ?Sized>(
    dev: &D,
    last_lba: u64,
    bootable: bool,
) -> io::Result<()> {
    let mut sector = [0u8; 512];
    dev.read_exact_at(&mut sector, 0)?;

    sector[510..512].copy_from_slice(&BOOT_SIGNATURE);

    let entry = &mut sector[ENTRY_OFFSET..ENTRY_OFFSET + 16];

    entry[0] = if bootable { 0x80 } else { 0x00 };

    // CHS start and end, conventional saturated values
    entry[1..4].copy_from_slice(&[0x00, 0x02, 0x00]);
    entry[5..8].copy_from_slice(&[0xFF, 0xFF, 0xFF]);

    // EFI protective partition type
    entry[4] = 0xEE;

    // start LBA 1, length capped at the 32-bit field
    entry[8..12].copy_from_slice(&1u32.to_le_bytes());

    let sectors = u32::try_from(last_lba).unwrap_or(u32::MAX);
    entry[12..16].copy_from_slice(&sectors.to_le_bytes());

    dev.write_all_at(&sector, 0)
}
