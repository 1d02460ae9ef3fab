// SPDX-License-Identifier: MIT

use crate::device::KernelError;

/// Unified error type for the GPT engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Device cannot hold a GPT (fewer than 34 sectors).
    #[error("device too small for GPT")]
    TooSmall,

    /// Neither the primary nor the backup header passed validation.
    #[error("no GPT header found")]
    NoTable,

    /// No free range can hold the requested partition.
    #[error("no allocatable range found for {0} bytes")]
    NoSpace(u64),

    #[error("partition size {size} is smaller than the sector size {sector_size}")]
    PartitionTooSmall { size: u64, sector_size: u64 },

    #[error("requested growth {requested} exceeds available growth {available}")]
    GrowthExceeded { requested: u64, available: u64 },

    /// Partition name does not fit the 72-byte UTF-16LE field.
    #[error("partition name {name:?} too long: {len} bytes encoded")]
    NameTooLong { name: String, len: usize },

    #[error("partition {0} out of range")]
    OutOfRange(usize),

    #[error("partition {0} is not allocated")]
    NotAllocated(usize),

    #[error("failed to enumerate kernel partitions")]
    KernelEnumerate(#[source] KernelError),

    #[error("failed to sync partition {partition} with the kernel")]
    KernelSync {
        partition: usize,
        #[source]
        source: KernelError,
    },
}

pub type Result<T = ()> = std::result::Result<T, Error>;
