// SPDX-License-Identifier: MIT

use crate::magic::Magic;
use crate::probe::Prober;
use crate::{fs, part};

/// An ordered set of probers; declaration order is trial order.
pub struct Chain {
    probers: Vec<Box<dyn Prober + Send + Sync>>,
}

impl Chain {
    pub fn new(probers: Vec<Box<dyn Prober + Send + Sync>>) -> Self {
        Self { probers }
    }

    /// The largest buffer any magic in the chain needs.
    pub fn max_magic_size(&self) -> usize {
        self.probers
            .iter()
            .flat_map(|p| p.magics())
            .map(Magic::block_size)
            .max()
            .unwrap_or(0)
    }

    /// Probers whose magic matches `buf`, in chain order, each paired with
    /// the first of its magics that matched.
    pub fn matches<'a>(&'a self, buf: &[u8]) -> Vec<(&'a (dyn Prober + Send + Sync), &'a Magic)> {
        self.probers
            .iter()
            .filter_map(|prober| {
                prober
                    .magics()
                    .iter()
                    .find(|magic| magic.matches(buf))
                    .map(|magic| (prober.as_ref(), magic))
            })
            .collect()
    }
}

impl Default for Chain {
    /// The default prober chain.
    ///
    /// Offset-anchored magics come first because they are cheapest to
    /// reject; the NULL-magic probers (gpt, zfs) run late so they only
    /// claim a device no specific format matched.
    fn default() -> Self {
        Self::new(vec![
            Box::new(fs::xfs::Probe),
            Box::new(fs::ext::Probe),
            Box::new(fs::vfat::Probe),
            Box::new(fs::swap::Probe),
            Box::new(fs::lvm2::Probe),
            Box::new(part::gpt::Probe),
            Box::new(fs::zfs::Probe),
            Box::new(fs::squashfs::Probe),
            Box::new(fs::talosmeta::Probe),
            Box::new(fs::luks::Probe),
            Box::new(fs::iso9660::Probe),
            Box::new(fs::bluestore::Probe),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_magic_size_is_the_largest_swap_offset() {
        // SWAPSPACE2 at 0xfff6 plus the 10-byte pattern
        assert_eq!(Chain::default().max_magic_size(), 0x10000);
    }

    #[test]
    fn null_magic_probers_always_match() {
        let chain = Chain::default();
        let matched = chain.matches(&[0u8; 128]);

        let names: Vec<&str> = matched.iter().map(|(p, _)| p.name()).collect();

        // nothing anchored matches zeroes; the NULL-magic probers remain
        assert_eq!(names, ["gpt", "zfs"]);
    }

    #[test]
    fn anchored_magic_selects_prober() {
        let chain = Chain::default();

        let mut buf = vec![0u8; 0x10000];
        buf[..4].copy_from_slice(b"XFSB");

        let matched = chain.matches(&buf);
        assert_eq!(matched[0].0.name(), "xfs");
    }
}
