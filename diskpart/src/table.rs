// SPDX-License-Identifier: MIT

use diskio::LbaExt;
use uuid::Uuid;
use zerocopy::little_endian::{U32, U64};
use zerocopy::IntoBytes;

use crate::attributes::Attributes;
use crate::device::{Device, KernelError};
use crate::error::{Error, Result};
use crate::options::{PartitionOptions, TableOptions};
use crate::pmbr;
use crate::structs::{self, ENTRY_SIZE, HEADER_SIZE, NUM_ENTRIES, REVISION, SIGNATURE};
use crate::util;

/// A single partition entry of an in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String,

    pub type_guid: Uuid,
    pub part_guid: Uuid,

    /// First and last LBA, inclusive.
    pub first_lba: u64,
    pub last_lba: u64,

    pub attrs: Attributes,
}

impl Partition {
    /// Partition size in bytes for the given sector size.
    pub fn size(&self, sector_size: u64) -> u64 {
        (self.last_lba - self.first_lba + 1) * sector_size
    }
}

/// In-memory GPT partition table bound to a device.
///
/// Entry slots are indexed by partition number minus one; a deleted
/// partition leaves a vacant slot so later numbers stay stable until
/// [`Table::compact`].
#[derive(Debug)]
pub struct Table<D> {
    dev: D,

    entries: Vec<Option<Partition>>,

    last_lba: u64,

    primary_header_lba: u64,
    secondary_header_lba: u64,
    primary_entries_lba: u64,
    secondary_entries_lba: u64,
    first_usable_lba: u64,
    last_usable_lba: u64,

    disk_guid: Uuid,

    options: TableOptions,

    alignment: u64,
    sector_size: u64,
}

#[derive(Debug, Clone, Copy)]
struct AllocatableRange {
    low_lba: u64,
    high_lba: u64,

    /// Slot index an allocation from this range inserts at.
    partition_idx: usize,

    size: u64,
}

impl<D: Device> Table<D> {
    /// Creates a new empty partition table for the device.
    ///
    /// Nothing is written until [`Table::write`].
    pub fn new(dev: D, options: TableOptions) -> Result<Self> {
        let last_lba =
            util::last_lba(dev.size(), dev.sector_size()).ok_or(Error::TooSmall)?;

        if last_lba < 33 {
            return Err(Error::TooSmall);
        }

        let disk_guid = options.disk_guid.unwrap_or_else(Uuid::new_v4);

        Ok(Self::init(dev, options, last_lba, disk_guid))
    }

    /// Reads the partition table from the device.
    ///
    /// The primary header is consulted first; the backup is only used when
    /// the primary fails validation. Vacant slots below the highest
    /// occupied index are preserved so partition numbers survive the
    /// round-trip.
    pub fn read(dev: D, options: TableOptions) -> Result<Self> {
        let sector_size = dev.sector_size();
        let last_lba = util::last_lba(dev.size(), sector_size).ok_or(Error::TooSmall)?;

        if last_lba < 33 {
            return Err(Error::TooSmall);
        }

        let (hdr, entries) = match structs::read_header(&dev, 1, last_lba, sector_size)? {
            Some(found) => found,
            None => structs::read_header(&dev, last_lba, last_lba, sector_size)?
                .ok_or(Error::NoTable)?,
        };

        let disk_guid = Uuid::from_bytes(util::guid_to_uuid(hdr.disk_guid));

        let mut table = Self::init(dev, options, last_lba, disk_guid);

        let mut slots: Vec<Option<Partition>> = vec![None; entries.len()];
        let mut last_filled = None;

        for (idx, entry) in entries.iter().enumerate() {
            if entry.is_empty() {
                continue;
            }

            let first_lba = entry.starting_lba.get();
            let last = entry.ending_lba.get();

            if first_lba < table.first_usable_lba || last > table.last_usable_lba {
                continue;
            }

            slots[idx] = Some(Partition {
                name: structs::decode_name(&entry.partition_name),
                type_guid: Uuid::from_bytes(util::guid_to_uuid(entry.partition_type_guid)),
                part_guid: Uuid::from_bytes(util::guid_to_uuid(entry.unique_partition_guid)),
                first_lba,
                last_lba: last,
                attrs: Attributes::from_bits_retain(entry.attributes.get()),
            });

            last_filled = Some(idx);
        }

        if let Some(last_filled) = last_filled {
            slots.truncate(last_filled + 1);
            table.entries = slots;
        }

        Ok(table)
    }

    fn init(dev: D, options: TableOptions, last_lba: u64, disk_guid: Uuid) -> Self {
        let sector_size = dev.sector_size();

        let entries_lbas = ((ENTRY_SIZE * NUM_ENTRIES) as u64).div_ceil(sector_size);

        let primary_header_lba = 1;
        let secondary_header_lba = last_lba;

        let primary_entries_lba = primary_header_lba + 1 + options.skip_lbas;
        let secondary_entries_lba = secondary_header_lba - entries_lbas;

        let alignment = dev.io_size().max(2048 * 512).div_ceil(sector_size);

        let first_usable_lba =
            util::align_up(primary_entries_lba + entries_lbas, alignment);
        let last_usable_lba = secondary_entries_lba - 1;

        Self {
            dev,
            entries: Vec::new(),
            last_lba,
            primary_header_lba,
            secondary_header_lba,
            primary_entries_lba,
            secondary_entries_lba,
            first_usable_lba,
            last_usable_lba,
            disk_guid,
            options,
            alignment,
            sector_size,
        }
    }

    pub fn disk_guid(&self) -> Uuid {
        self.disk_guid
    }

    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    /// Partition alignment in LBAs.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn first_usable_lba(&self) -> u64 {
        self.first_usable_lba
    }

    pub fn last_usable_lba(&self) -> u64 {
        self.last_usable_lba
    }

    /// The slot list; a `None` is a vacant slot keeping later partition
    /// numbers stable. Slot `i` is partition number `i + 1`.
    pub fn partitions(&self) -> &[Option<Partition>] {
        &self.entries
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes vacant slots, renumbering later partitions.
    pub fn compact(&mut self) {
        self.entries.retain(Option::is_some);
    }

    /// Highest aligned LBA an allocation may cover.
    fn last_allocatable_lba(&self) -> Option<u64> {
        util::align_down(self.last_usable_lba + 1, self.alignment).checked_sub(1)
    }

    fn allocatable_ranges(&self) -> Vec<AllocatableRange> {
        let mut ranges = Vec::new();

        let mut idx = 0;
        let mut low_lba = self.first_usable_lba;

        loop {
            while idx < self.entries.len() && self.entries[idx].is_none() {
                idx += 1;
            }

            let high_lba = match self.entries.get(idx) {
                Some(Some(entry)) => entry.first_lba.saturating_sub(1),
                _ => match self.last_allocatable_lba() {
                    Some(last) => last,
                    None => break,
                },
            };

            let aligned_low = util::align_up(low_lba, self.alignment);

            if high_lba > aligned_low {
                ranges.push(AllocatableRange {
                    low_lba: aligned_low,
                    high_lba,
                    partition_idx: idx,
                    size: (high_lba - aligned_low + 1) * self.sector_size,
                });
            }

            match self.entries.get(idx) {
                Some(Some(entry)) => {
                    low_lba = entry.last_lba + 1;
                    idx += 1;
                }
                _ => break,
            }
        }

        ranges
    }

    /// Size in bytes of the largest contiguous allocatable range.
    pub fn largest_contiguous_allocatable(&self) -> u64 {
        self.allocatable_ranges()
            .iter()
            .map(|r| r.size)
            .max()
            .unwrap_or(0)
    }

    /// Allocates a partition of `size` bytes into the smallest free range
    /// that fits (best fit).
    ///
    /// Returns the 1-based partition number and the created entry. The
    /// table is left untouched on failure.
    pub fn allocate_partition(
        &mut self,
        size: u64,
        name: &str,
        part_type: Uuid,
        options: PartitionOptions,
    ) -> Result<(usize, Partition)> {
        if size < self.sector_size {
            return Err(Error::PartitionTooSmall {
                size,
                sector_size: self.sector_size,
            });
        }

        let part_guid = options.unique_guid.unwrap_or_else(Uuid::new_v4);

        let best = self
            .allocatable_ranges()
            .into_iter()
            .filter(|r| r.size >= size)
            .min_by_key(|r| r.size)
            .ok_or(Error::NoSpace(size))?;

        let entry = Partition {
            name: name.to_owned(),
            type_guid: part_type,
            part_guid,
            first_lba: best.low_lba,
            last_lba: best.low_lba + size / self.sector_size - 1,
            attrs: options.attrs,
        };

        let idx = best.partition_idx;

        let number = if idx > 0 && self.entries[idx - 1].is_none() {
            self.entries[idx - 1] = Some(entry.clone());
            idx
        } else {
            self.entries.insert(idx, Some(entry.clone()));
            idx + 1
        };

        Ok((number, entry))
    }

    /// Bytes that partition `partition` (0-based slot index) can grow by,
    /// i.e. the size of the free range immediately following it.
    pub fn available_partition_growth(&self, partition: usize) -> Result<u64> {
        if partition >= self.entries.len() {
            return Err(Error::OutOfRange(partition));
        }

        if self.entries[partition].is_none() {
            return Err(Error::NotAllocated(partition));
        }

        Ok(self
            .allocatable_ranges()
            .iter()
            .find(|r| r.partition_idx == partition + 1)
            .map(|r| r.size)
            .unwrap_or(0))
    }

    /// Grows partition `partition` (0-based slot index) by `size` bytes.
    pub fn grow_partition(&mut self, partition: usize, size: u64) -> Result {
        let available = self.available_partition_growth(partition)?;

        if size > available {
            return Err(Error::GrowthExceeded {
                requested: size,
                available,
            });
        }

        let sector_size = self.sector_size;

        if let Some(entry) = &mut self.entries[partition] {
            entry.last_lba += size / sector_size;
        }

        Ok(())
    }

    /// Deletes partition `partition` (0-based slot index), leaving a
    /// vacant slot.
    pub fn delete_partition(&mut self, partition: usize) -> Result {
        if partition >= self.entries.len() {
            return Err(Error::OutOfRange(partition));
        }

        self.entries[partition] = None;

        Ok(())
    }

    /// Writes the partition table to the device.
    ///
    /// On-disk order: primary header, primary entries, backup entries,
    /// backup header, protective MBR (unless suppressed), sync, kernel
    /// partition-table reconciliation.
    pub fn write(&mut self) -> Result {
        let mut entries_buf = vec![0u8; ENTRY_SIZE * NUM_ENTRIES];

        for (i, slot) in self.entries.iter().enumerate() {
            let Some(part) = slot else {
                // vacant slot stays zeroed
                continue;
            };

            let name = structs::encode_name(&part.name).ok_or_else(|| Error::NameTooLong {
                name: part.name.clone(),
                len: part.name.encode_utf16().count() * 2,
            })?;

            let entry = structs::Entry {
                partition_type_guid: util::uuid_to_guid(*part.type_guid.as_bytes()),
                unique_partition_guid: util::uuid_to_guid(*part.part_guid.as_bytes()),
                starting_lba: U64::new(part.first_lba),
                ending_lba: U64::new(part.last_lba),
                attributes: U64::new(part.attrs.bits()),
                partition_name: name,
            };

            entries_buf[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE].copy_from_slice(entry.as_bytes());
        }

        let entries_crc = crc32fast::hash(&entries_buf);

        let template = structs::Header {
            signature: U64::new(SIGNATURE),
            revision: U32::new(REVISION),
            header_size: U32::new(HEADER_SIZE as u32),
            header_crc32: U32::ZERO,
            reserved: U32::ZERO,
            my_lba: U64::ZERO,
            alternate_lba: U64::ZERO,
            first_usable_lba: U64::new(self.first_usable_lba),
            last_usable_lba: U64::new(self.last_usable_lba),
            disk_guid: util::uuid_to_guid(*self.disk_guid.as_bytes()),
            partition_entries_lba: U64::ZERO,
            num_partition_entries: U32::new(NUM_ENTRIES as u32),
            sizeof_partition_entry: U32::new(ENTRY_SIZE as u32),
            partition_entry_array_crc32: U32::new(entries_crc),
        };

        let mut primary = template;
        primary.my_lba = U64::new(self.primary_header_lba);
        primary.alternate_lba = U64::new(self.secondary_header_lba);
        primary.partition_entries_lba = U64::new(self.primary_entries_lba);
        primary.header_crc32 = U32::new(primary.checksum());

        let mut secondary = template;
        secondary.my_lba = U64::new(self.secondary_header_lba);
        secondary.alternate_lba = U64::new(self.primary_header_lba);
        secondary.partition_entries_lba = U64::new(self.secondary_entries_lba);
        secondary.header_crc32 = U32::new(secondary.checksum());

        // headers occupy a whole sector, zero past the 92 bytes
        let mut sector = vec![0u8; self.sector_size as usize];

        sector[..HEADER_SIZE].copy_from_slice(primary.as_bytes());
        self.dev
            .write_all_at_lba(self.primary_header_lba, self.sector_size, &sector)?;

        self.dev
            .write_all_at_lba(self.primary_entries_lba, self.sector_size, &entries_buf)?;

        self.dev
            .write_all_at_lba(self.secondary_entries_lba, self.sector_size, &entries_buf)?;

        sector[..HEADER_SIZE].copy_from_slice(secondary.as_bytes());
        self.dev
            .write_all_at_lba(self.secondary_header_lba, self.sector_size, &sector)?;

        if !self.options.skip_pmbr {
            pmbr::write_protective_mbr(
                &self.dev,
                self.last_lba,
                self.options.mark_pmbr_bootable,
            )?;
        }

        self.dev.sync()?;

        self.sync_kernel()
    }

    /// Reconciles the kernel's partition table with the in-memory one.
    ///
    /// Every partition number up to the maximum of both views is deleted
    /// and re-added; a busy partition whose entry still exists is resized
    /// in place instead.
    fn sync_kernel(&self) -> Result {
        let kernel_last = self
            .dev
            .kernel_last_partition_num()
            .map_err(Error::KernelEnumerate)?;

        let total = kernel_last.max(self.entries.len());

        for no in 1..=total {
            let entry = self.entries.get(no - 1).and_then(Option::as_ref);

            match self.dev.kernel_partition_delete(no) {
                Ok(()) => {}
                Err(KernelError::NoSuchPartition) => {}
                Err(KernelError::Busy) => {
                    if let Some(entry) = entry {
                        log::debug!("partition {no} busy, resizing in place");

                        self.dev
                            .kernel_partition_resize(
                                no,
                                entry.first_lba * self.sector_size,
                                entry.size(self.sector_size),
                            )
                            .map_err(|source| Error::KernelSync {
                                partition: no,
                                source,
                            })?;

                        continue;
                    }

                    return Err(Error::KernelSync {
                        partition: no,
                        source: KernelError::Busy,
                    });
                }
                Err(source) => {
                    return Err(Error::KernelSync {
                        partition: no,
                        source,
                    });
                }
            }

            if let Some(entry) = entry {
                self.dev
                    .kernel_partition_add(
                        no,
                        entry.first_lba * self.sector_size,
                        entry.size(self.sector_size),
                    )
                    .map_err(|source| Error::KernelSync {
                        partition: no,
                        source,
                    })?;
            }
        }

        Ok(())
    }

    /// Returns the underlying device.
    pub fn into_device(self) -> D {
        self.dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ImageDevice;
    use diskio::MemIo;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn image_table(size: u64) -> Table<ImageDevice<MemIo>> {
        let dev = ImageDevice::new(MemIo::zeroed(size as usize), size, 512);

        Table::new(dev, TableOptions::new()).unwrap()
    }

    #[test]
    fn geometry_for_512_byte_sectors() {
        let table = image_table(2 * GIB);
        let sectors = 2 * GIB / 512;

        assert_eq!(table.first_usable_lba(), 2048);
        assert_eq!(table.last_usable_lba(), sectors - 34);
        assert_eq!(table.alignment(), 2048);
    }

    #[test]
    fn too_small_device() {
        let dev = ImageDevice::new(MemIo::zeroed(16 * 1024), 16 * 1024, 512);

        assert!(matches!(
            Table::new(dev, TableOptions::new()),
            Err(Error::TooSmall)
        ));
    }

    #[test]
    fn empty_table_largest_allocatable() {
        let table = image_table(6 * GIB);

        // everything between the two aligned metadata areas
        assert_eq!(
            table.largest_contiguous_allocatable(),
            6 * GIB - (2048 + 2048) * 512
        );
    }

    #[test]
    fn best_fit_allocation_prefers_smallest_range() {
        let mut table = image_table(6 * GIB);

        let ty = Uuid::new_v4();
        table
            .allocate_partition(GIB, "first", ty, PartitionOptions::new())
            .unwrap();
        table
            .allocate_partition(GIB, "second", ty, PartitionOptions::new())
            .unwrap();
        table
            .allocate_partition(GIB, "third", ty, PartitionOptions::new())
            .unwrap();

        // free the middle 1 GiB; the gap is smaller than the tail range
        table.delete_partition(1).unwrap();

        let (number, part) = table
            .allocate_partition(200 * MIB, "gap", ty, PartitionOptions::new())
            .unwrap();

        assert_eq!(number, 2);
        assert_eq!(part.first_lba, 2048 + GIB / 512);
    }

    #[test]
    fn allocation_failure_leaves_table_unchanged() {
        let mut table = image_table(2 * GIB);

        let before: Vec<_> = table.partitions().to_vec();
        let too_big = table.largest_contiguous_allocatable() + 512;

        assert!(matches!(
            table.allocate_partition(too_big, "huge", Uuid::new_v4(), PartitionOptions::new()),
            Err(Error::NoSpace(_))
        ));
        assert_eq!(table.partitions(), &before[..]);
    }

    #[test]
    fn rejects_sub_sector_allocation() {
        let mut table = image_table(2 * GIB);

        assert!(matches!(
            table.allocate_partition(256, "tiny", Uuid::new_v4(), PartitionOptions::new()),
            Err(Error::PartitionTooSmall { .. })
        ));
    }

    #[test]
    fn growth_accounting() {
        let mut table = image_table(6 * GIB);

        let ty = Uuid::new_v4();
        table
            .allocate_partition(GIB, "fixed", ty, PartitionOptions::new())
            .unwrap();
        table
            .allocate_partition(GIB, "grow", ty, PartitionOptions::new())
            .unwrap();

        // the first partition has no trailing free range
        assert_eq!(table.available_partition_growth(0).unwrap(), 0);

        let growth = table.available_partition_growth(1).unwrap();
        assert_eq!(growth, 4 * GIB - (2048 + 2048) * 512);

        assert!(matches!(
            table.grow_partition(1, growth + 512),
            Err(Error::GrowthExceeded { .. })
        ));

        table.grow_partition(1, growth).unwrap();
        assert_eq!(table.available_partition_growth(1).unwrap(), 0);
    }

    #[test]
    fn entries_stay_sorted_and_aligned() {
        let mut table = image_table(6 * GIB);

        let ty = Uuid::new_v4();
        for (size, name) in [(GIB, "a"), (100 * MIB, "b"), (300 * MIB, "c")] {
            table
                .allocate_partition(size, name, ty, PartitionOptions::new())
                .unwrap();
        }

        table.delete_partition(1).unwrap();
        table
            .allocate_partition(50 * MIB, "d", ty, PartitionOptions::new())
            .unwrap();

        let live: Vec<&Partition> = table.partitions().iter().flatten().collect();

        for pair in live.windows(2) {
            assert!(pair[0].last_lba < pair[1].first_lba, "entries overlap");
        }

        for part in live {
            assert_eq!(part.first_lba % table.alignment(), 0, "unaligned start");
        }
    }

    #[test]
    fn compact_renumbers() {
        let mut table = image_table(6 * GIB);

        let ty = Uuid::new_v4();
        table
            .allocate_partition(GIB, "a", ty, PartitionOptions::new())
            .unwrap();
        table
            .allocate_partition(GIB, "b", ty, PartitionOptions::new())
            .unwrap();

        table.delete_partition(0).unwrap();
        assert_eq!(table.partitions().len(), 2);
        assert!(table.partitions()[0].is_none());

        table.compact();
        assert_eq!(table.partitions().len(), 1);
        assert_eq!(table.partitions()[0].as_ref().unwrap().name, "b");
    }
}
