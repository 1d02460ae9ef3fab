// SPDX-License-Identifier: MIT

use bitflags::bitflags;

bitflags! {
    /// GPT partition attribute bits.
    ///
    /// Unknown bits are preserved verbatim across read/write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attributes: u64 {
        /// Required by the platform to function.
        const PLATFORM_REQUIRED = 1 << 0;
        /// EFI firmware should ignore the partition content.
        const NO_BLOCK_IO_PROTOCOL = 1 << 1;
        /// Legacy BIOS bootable.
        const LEGACY_BIOS_BOOTABLE = 1 << 2;

        const _ = !0;
    }
}
