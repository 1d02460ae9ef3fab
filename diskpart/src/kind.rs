// SPDX-License-Identifier: MIT

use core::fmt;

use uuid::{uuid, Uuid};

/// EFI System Partition.
pub const TYPE_ESP: Uuid = uuid!("C12A7328-F81F-11D2-BA4B-00A0C93EC93B");
/// BIOS boot partition (GRUB on GPT).
pub const TYPE_BIOS_BOOT: Uuid = uuid!("21686148-6449-6E6F-744E-656564454649");
/// Linux filesystem data.
pub const TYPE_LINUX_FS: Uuid = uuid!("0FC63DAF-8483-4772-8E79-3D69D8477DE4");
/// Linux swap.
pub const TYPE_LINUX_SWAP: Uuid = uuid!("0657FD6D-A4AB-43C4-84E5-0933C84B4F4F");
/// Linux LVM physical volume.
pub const TYPE_LINUX_LVM: Uuid = uuid!("E6D6D379-F507-44C2-A23C-238F2A3DF928");
/// Linux RAID member.
pub const TYPE_LINUX_RAID: Uuid = uuid!("A19D880F-05FC-4D3B-A006-743F0F84911E");
/// Microsoft basic data.
pub const TYPE_MICROSOFT_BASIC_DATA: Uuid = uuid!("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7");
/// Microsoft reserved.
pub const TYPE_MICROSOFT_RESERVED: Uuid = uuid!("E3C9E316-0B5C-4DB8-817D-F92DF00215AE");

/// Well-known GPT partition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    EfiSystem,
    BiosBoot,
    LinuxFilesystem,
    LinuxSwap,
    LinuxLvm,
    LinuxRaid,
    MicrosoftBasicData,
    MicrosoftReserved,
    Unknown(Uuid),
}

const KNOWN: [(Uuid, PartitionKind); 8] = [
    (TYPE_ESP, PartitionKind::EfiSystem),
    (TYPE_BIOS_BOOT, PartitionKind::BiosBoot),
    (TYPE_LINUX_FS, PartitionKind::LinuxFilesystem),
    (TYPE_LINUX_SWAP, PartitionKind::LinuxSwap),
    (TYPE_LINUX_LVM, PartitionKind::LinuxLvm),
    (TYPE_LINUX_RAID, PartitionKind::LinuxRaid),
    (TYPE_MICROSOFT_BASIC_DATA, PartitionKind::MicrosoftBasicData),
    (TYPE_MICROSOFT_RESERVED, PartitionKind::MicrosoftReserved),
];

impl PartitionKind {
    pub fn from_type_guid(guid: Uuid) -> Self {
        KNOWN
            .iter()
            .find(|(known, _)| *known == guid)
            .map(|(_, kind)| *kind)
            .unwrap_or(Self::Unknown(guid))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EfiSystem => f.write_str("EFI System Partition"),
            Self::BiosBoot => f.write_str("BIOS Boot Partition"),
            Self::LinuxFilesystem => f.write_str("Linux Filesystem"),
            Self::LinuxSwap => f.write_str("Linux Swap"),
            Self::LinuxLvm => f.write_str("Linux LVM"),
            Self::LinuxRaid => f.write_str("Linux RAID"),
            Self::MicrosoftBasicData => f.write_str("Microsoft Basic Data"),
            Self::MicrosoftReserved => f.write_str("Microsoft Reserved"),
            Self::Unknown(guid) => write!(f, "Unknown ({guid})"),
        }
    }
}
