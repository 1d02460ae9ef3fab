// SPDX-License-Identifier: MIT

//! Ceph bluestore prober: the magic alone is the confirmation.

use std::io;

use crate::magic::Magic;
use crate::probe::{ProbeReader, Prober, ScanResult};

static MAGICS: [Magic; 1] = [Magic {
    offset: 0,
    value: b"bluestore block device",
}];

pub struct Probe;

impl Prober for Probe {
    fn name(&self) -> &'static str {
        "bluestore"
    }

    fn magics(&self) -> &'static [Magic] {
        &MAGICS
    }

    fn probe(&self, _r: &ProbeReader<'_>, _magic: &Magic) -> io::Result<Option<ScanResult>> {
        Ok(Some(ScanResult::default()))
    }
}
