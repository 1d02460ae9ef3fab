// SPDX-License-Identifier: MIT

//! Write/read round-trips against disk images, checked field by field and
//! against the raw on-disk layout.

use diskio::{Flush, MemIo, ReadAt, WriteAt};
use diskpart::structs;
use diskpart::{ImageDevice, PartitionOptions, Table, TableOptions};
use uuid::Uuid;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

const EFI_TYPE: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
const BIOS_TYPE: &str = "21686148-6449-6E6F-744E-656564454649";
const LINUX_TYPE: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";

fn image_device(size: u64) -> ImageDevice<MemIo> {
    ImageDevice::new(MemIo::zeroed(size as usize), size, 512)
}

/// Talos-style six-partition layout on a 2 GiB disk.
fn build_talos_layout<IO: ReadAt + WriteAt + Flush>(table: &mut Table<ImageDevice<IO>>) {
    let efi = Uuid::parse_str(EFI_TYPE).unwrap();
    let bios = Uuid::parse_str(BIOS_TYPE).unwrap();
    let linux = Uuid::parse_str(LINUX_TYPE).unwrap();

    table
        .allocate_partition(204800 * 512, "EFI", efi, PartitionOptions::new())
        .unwrap();
    table
        .allocate_partition(
            2048 * 512,
            "BIOS",
            bios,
            PartitionOptions::new().legacy_bios_bootable(true),
        )
        .unwrap();
    table
        .allocate_partition(2048000 * 512, "BOOT", linux, PartitionOptions::new())
        .unwrap();
    table
        .allocate_partition(2048 * 512, "META", linux, PartitionOptions::new())
        .unwrap();
    table
        .allocate_partition(204800 * 512, "STATE", linux, PartitionOptions::new())
        .unwrap();

    let rest = table.largest_contiguous_allocatable();
    table
        .allocate_partition(rest, "EPHEMERAL", linux, PartitionOptions::new())
        .unwrap();
}

#[test]
fn talos_layout_offsets() {
    let mut table = Table::new(image_device(2 * GIB), TableOptions::new()).unwrap();
    build_talos_layout(&mut table);

    let offsets: Vec<(String, u64, u64)> = table
        .partitions()
        .iter()
        .flatten()
        .map(|p| (p.name.clone(), p.first_lba * 512, p.size(512)))
        .collect();

    assert_eq!(
        offsets,
        vec![
            ("EFI".to_owned(), MIB, 100 * MIB),
            ("BIOS".to_owned(), 101 * MIB, MIB),
            ("BOOT".to_owned(), 102 * MIB, 1000 * MIB),
            ("META".to_owned(), 1102 * MIB, MIB),
            ("STATE".to_owned(), 1103 * MIB, 100 * MIB),
            ("EPHEMERAL".to_owned(), 1203 * MIB, 844 * MIB),
        ]
    );
}

#[test]
fn write_read_roundtrip() {
    let guid = Uuid::parse_str("DDDA0816-8B53-47BF-A813-9EBB1F73AAA2").unwrap();

    let mut table = Table::new(
        image_device(2 * GIB),
        TableOptions::new().with_disk_guid(guid),
    )
    .unwrap();

    build_talos_layout(&mut table);
    table.write().unwrap();

    let table2 = Table::read(table.into_device(), TableOptions::new()).unwrap();

    assert_eq!(table2.disk_guid(), guid);

    let mut table = Table::read(table2.into_device(), TableOptions::new()).unwrap();
    build_talos_layout_check(&table);

    // a second write must be stable
    table.write().unwrap();
    let table3 = Table::read(table.into_device(), TableOptions::new()).unwrap();
    build_talos_layout_check(&table3);
}

fn build_talos_layout_check<IO: ReadAt + WriteAt + Flush>(table: &Table<ImageDevice<IO>>) {
    let names: Vec<&str> = table
        .partitions()
        .iter()
        .flatten()
        .map(|p| p.name.as_str())
        .collect();

    assert_eq!(names, ["EFI", "BIOS", "BOOT", "META", "STATE", "EPHEMERAL"]);

    let bios = table.partitions()[1].as_ref().unwrap();
    assert!(bios
        .attrs
        .contains(diskpart::Attributes::LEGACY_BIOS_BOOTABLE));
}

#[test]
fn roundtrip_preserves_vacant_slots() {
    let mut table = Table::new(image_device(6 * GIB), TableOptions::new()).unwrap();

    let linux = Uuid::parse_str(LINUX_TYPE).unwrap();
    table
        .allocate_partition(GIB, "one", linux, PartitionOptions::new())
        .unwrap();
    table
        .allocate_partition(GIB, "two", linux, PartitionOptions::new())
        .unwrap();
    table.delete_partition(0).unwrap();

    table.write().unwrap();

    let table2 = Table::read(table.into_device(), TableOptions::new()).unwrap();

    assert_eq!(table2.partitions().len(), 2);
    assert!(table2.partitions()[0].is_none());
    assert_eq!(table2.partitions()[1].as_ref().unwrap().name, "two");
}

#[test]
fn both_headers_pass_validation_after_write() {
    let mut table = Table::new(image_device(2 * GIB), TableOptions::new()).unwrap();
    build_talos_layout(&mut table);
    table.write().unwrap();

    let dev = table.into_device();
    let last_lba = 2 * GIB / 512 - 1;

    let primary = structs::read_header(&dev, 1, last_lba, 512).unwrap();
    let backup = structs::read_header(&dev, last_lba, last_lba, 512).unwrap();

    let (primary_hdr, primary_entries) = primary.expect("primary header invalid");
    let (backup_hdr, backup_entries) = backup.expect("backup header invalid");

    assert_eq!(primary_entries, backup_entries);

    // the copies differ only in placement fields and their CRC
    assert_eq!(primary_hdr.my_lba.get(), 1);
    assert_eq!(primary_hdr.alternate_lba.get(), last_lba);
    assert_eq!(backup_hdr.my_lba.get(), last_lba);
    assert_eq!(backup_hdr.alternate_lba.get(), 1);

    assert_eq!(
        primary_hdr.first_usable_lba.get(),
        backup_hdr.first_usable_lba.get()
    );
    assert_eq!(
        primary_hdr.last_usable_lba.get(),
        backup_hdr.last_usable_lba.get()
    );
    assert_eq!(primary_hdr.disk_guid, backup_hdr.disk_guid);
    assert_eq!(
        primary_hdr.partition_entry_array_crc32.get(),
        backup_hdr.partition_entry_array_crc32.get()
    );
}

#[test]
fn survives_zeroed_first_mib() {
    let guid = Uuid::parse_str("DDDA0816-8B53-47BF-A813-9EBB1F73AAA2").unwrap();

    let mut table = Table::new(
        image_device(2 * GIB),
        TableOptions::new().with_disk_guid(guid),
    )
    .unwrap();
    build_talos_layout(&mut table);
    table.write().unwrap();

    let dev = table.into_device();
    let io = dev.into_inner();
    io.with_bytes_mut(|bytes| bytes[..MIB as usize].fill(0));

    let dev = ImageDevice::new(io, 2 * GIB, 512);
    let table = Table::read(dev, TableOptions::new()).unwrap();

    assert_eq!(table.disk_guid(), guid);
    build_talos_layout_check(&table);
}

#[test]
fn pmbr_written_and_suppressed() {
    let mut table = Table::new(image_device(2 * GIB), TableOptions::new()).unwrap();
    table.write().unwrap();

    let dev = table.into_device();
    let mut sector = [0u8; 512];
    dev.read_exact_at(&mut sector, 0).unwrap();

    assert_eq!(sector[450], 0xEE);
    assert_eq!(&sector[510..512], &[0x55, 0xAA]);
    let expected_len = u32::try_from(2 * GIB / 512 - 1).unwrap();
    assert_eq!(&sector[458..462], &expected_len.to_le_bytes());

    let mut table = Table::new(
        image_device(2 * GIB),
        TableOptions::new().skip_pmbr(),
    )
    .unwrap();
    table.write().unwrap();

    let dev = table.into_device();
    dev.read_exact_at(&mut sector, 0).unwrap();
    assert_eq!(sector, [0u8; 512]);
}

#[test]
fn name_too_long_fails_write() {
    let mut table = Table::new(image_device(2 * GIB), TableOptions::new()).unwrap();

    table
        .allocate_partition(
            MIB,
            &"n".repeat(37),
            Uuid::parse_str(LINUX_TYPE).unwrap(),
            PartitionOptions::new(),
        )
        .unwrap();

    assert!(matches!(
        table.write(),
        Err(diskpart::Error::NameTooLong { .. })
    ));
}

#[test]
fn unicode_names_roundtrip() {
    let mut table = Table::new(image_device(2 * GIB), TableOptions::new()).unwrap();

    table
        .allocate_partition(
            MIB,
            "données-😀",
            Uuid::parse_str(LINUX_TYPE).unwrap(),
            PartitionOptions::new(),
        )
        .unwrap();

    table.write().unwrap();

    let table2 = Table::read(table.into_device(), TableOptions::new()).unwrap();
    assert_eq!(table2.partitions()[0].as_ref().unwrap().name, "données-😀");
}

#[test]
fn file_backed_image_roundtrip() {
    let file = tempfile::tempfile().unwrap();
    file.set_len(2 * GIB).unwrap();

    let dev = ImageDevice::from_file(file, 512).unwrap();

    let mut table = Table::new(dev, TableOptions::new()).unwrap();
    build_talos_layout(&mut table);
    table.write().unwrap();

    let table2 = Table::read(table.into_device(), TableOptions::new()).unwrap();
    build_talos_layout_check(&table2);
}

#[test]
fn four_kib_sector_geometry() {
    let size = 2 * GIB;
    let dev = ImageDevice::new(MemIo::zeroed(size as usize), size, 4096);

    let mut table = Table::new(dev, TableOptions::new()).unwrap();

    // 1 MiB alignment is 256 sectors of 4 KiB
    assert_eq!(table.alignment(), 256);
    assert_eq!(table.first_usable_lba(), 256);

    table
        .allocate_partition(
            100 * MIB,
            "data",
            Uuid::parse_str(LINUX_TYPE).unwrap(),
            PartitionOptions::new(),
        )
        .unwrap();
    table.write().unwrap();

    let table2 = Table::read(table.into_device(), TableOptions::new()).unwrap();
    let part = table2.partitions()[0].as_ref().unwrap();

    assert_eq!(part.first_lba, 256);
    assert_eq!(part.size(4096), 100 * MIB);
}
