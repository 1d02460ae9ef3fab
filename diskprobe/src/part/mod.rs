// SPDX-License-Identifier: MIT

//! Partition-table probers.

pub mod gpt;
