// SPDX-License-Identifier: MIT

//! GPT on-disk structures and the validated header read path.
//!
//! Field types carry the wire endianness, so decoding is a plain byte-slice
//! reinterpretation and no host-alignment or byte-order assumptions leak in.

use std::io;

use diskio::ReadAt;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// "EFI PART", little-endian.
pub const SIGNATURE: u64 = 0x5452415020494645;
/// Revision 1.0, the only one written.
pub const REVISION: u32 = 0x0001_0000;
/// Size of the meaningful header prefix in bytes.
pub const HEADER_SIZE: usize = 92;
/// Size of one partition entry in bytes.
pub const ENTRY_SIZE: usize = 128;
/// Number of entries in the partition entry array.
pub const NUM_ENTRIES: usize = 128;

/// GPT header, the 92-byte meaningful prefix of the header sector.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Header {
    pub signature: U64,
    pub revision: U32,
    pub header_size: U32,
    pub header_crc32: U32,
    pub reserved: U32,
    pub my_lba: U64,
    pub alternate_lba: U64,
    pub first_usable_lba: U64,
    pub last_usable_lba: U64,
    /// Mixed-endian GUID, see [`crate::util::guid_to_uuid`].
    pub disk_guid: [u8; 16],
    pub partition_entries_lba: U64,
    pub num_partition_entries: U32,
    pub sizeof_partition_entry: U32,
    pub partition_entry_array_crc32: U32,
}

/// GPT partition entry (128 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Entry {
    pub partition_type_guid: [u8; 16],
    pub unique_partition_guid: [u8; 16],
    pub starting_lba: U64,
    pub ending_lba: U64,
    pub attributes: U64,
    /// UTF-16LE, NUL-padded.
    pub partition_name: [u8; 72],
}

impl Entry {
    /// True when the type GUID is all zeroes, i.e. the slot is unused.
    pub fn is_empty(&self) -> bool {
        self.partition_type_guid == [0u8; 16]
    }
}

impl Header {
    /// CRC32 of the 92-byte header with the CRC field zeroed.
    ///
    /// Valid for headers this engine writes (`header_size` is always 92);
    /// for on-disk headers with a larger declared size use
    /// [`header_checksum_of_sector`].
    pub fn checksum(&self) -> u32 {
        let mut h = *self;
        h.header_crc32 = U32::ZERO;

        crc32fast::hash(h.as_bytes())
    }
}

/// CRC32 over the first `header_size` bytes of a header sector, with the
/// CRC field (bytes 16..20) zeroed.
pub fn header_checksum_of_sector(sector: &[u8], header_size: usize) -> u32 {
    let mut buf = sector[..header_size].to_vec();
    buf[16..20].fill(0);

    crc32fast::hash(&buf)
}

/// Encodes a partition name as UTF-16LE into the 72-byte name field.
///
/// Returns `None` when the encoded name exceeds 72 bytes.
pub fn encode_name(name: &str) -> Option<[u8; 72]> {
    let mut buf = [0u8; 72];
    let mut pos = 0;

    for unit in name.encode_utf16() {
        if pos + 2 > buf.len() {
            return None;
        }

        buf[pos..pos + 2].copy_from_slice(&unit.to_le_bytes());
        pos += 2;
    }

    Some(buf)
}

/// Decodes the UTF-16LE name field, stopping at the first NUL unit.
pub fn decode_name(field: &[u8; 72]) -> String {
    let units: Vec<u16> = field
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    String::from_utf16_lossy(&units)
}

/// Reads and fully validates the GPT header at `lba` together with its
/// partition entry array.
///
/// Returns `Ok(None)` when any validation step fails (not a GPT, corrupted
/// copy); I/O errors propagate. The caller decides whether to fall back to
/// the backup copy.
pub fn read_header<R: ReadAt + ?Sized>(
    r: &R,
    lba: u64,
    last_lba: u64,
    sector_size: u64,
) -> io::Result<Option<(Header, Vec<Entry>)>> {
    let mut sector = vec![0u8; sector_size as usize];
    r.read_exact_at(&mut sector, lba * sector_size)?;

    let Ok(hdr) = Header::read_from_bytes(&sector[..HEADER_SIZE]) else {
        return Ok(None);
    };

    if hdr.signature.get() != SIGNATURE {
        return Ok(None);
    }

    let header_size = hdr.header_size.get() as usize;
    if !(HEADER_SIZE..=sector_size as usize).contains(&header_size) {
        return Ok(None);
    }

    if hdr.header_crc32.get() != header_checksum_of_sector(&sector, header_size) {
        return Ok(None);
    }

    if hdr.my_lba.get() != lba {
        return Ok(None);
    }

    let first_usable = hdr.first_usable_lba.get();
    let last_usable = hdr.last_usable_lba.get();

    if last_usable < first_usable || first_usable > last_lba || last_usable > last_lba {
        return Ok(None);
    }

    // the header itself must sit outside the usable range
    if first_usable < lba && lba < last_usable {
        return Ok(None);
    }

    if hdr.sizeof_partition_entry.get() as usize != ENTRY_SIZE {
        return Ok(None);
    }

    let num_entries = hdr.num_partition_entries.get() as usize;
    if num_entries == 0 || num_entries > NUM_ENTRIES {
        return Ok(None);
    }

    let mut entries_buf = vec![0u8; num_entries * ENTRY_SIZE];
    r.read_exact_at(
        &mut entries_buf,
        hdr.partition_entries_lba.get() * sector_size,
    )?;

    if crc32fast::hash(&entries_buf) != hdr.partition_entry_array_crc32.get() {
        return Ok(None);
    }

    let entries = entries_buf
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| Entry::read_from_bytes(chunk))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "GPT entry decode failed"))?;

    Ok(Some((hdr, entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes() {
        assert_eq!(core::mem::size_of::<Header>(), HEADER_SIZE);
        assert_eq!(core::mem::size_of::<Entry>(), ENTRY_SIZE);
    }

    #[test]
    fn signature_spells_efi_part() {
        assert_eq!(&SIGNATURE.to_le_bytes(), b"EFI PART");
    }

    #[test]
    fn name_roundtrip() {
        let encoded = encode_name("EPHEMERAL").unwrap();
        assert_eq!(decode_name(&encoded), "EPHEMERAL");

        // 36 UTF-16 units exactly fill the field
        let max = "x".repeat(36);
        assert!(encode_name(&max).is_some());
        assert!(encode_name(&"x".repeat(37)).is_none());

        // non-BMP characters take two units each
        assert_eq!(decode_name(&encode_name("𐐷disk").unwrap()), "𐐷disk");
    }

    #[test]
    fn header_checksum_ignores_crc_field() {
        let mut hdr = Header::read_from_bytes(&[0u8; HEADER_SIZE]).unwrap();
        hdr.signature = U64::new(SIGNATURE);
        hdr.header_size = U32::new(HEADER_SIZE as u32);

        let crc = hdr.checksum();
        hdr.header_crc32 = U32::new(crc);

        // checksum of a sector-sized buffer with the CRC in place matches
        let mut sector = vec![0u8; 512];
        sector[..HEADER_SIZE].copy_from_slice(hdr.as_bytes());
        assert_eq!(header_checksum_of_sector(&sector, HEADER_SIZE), crc);
    }
}
