// SPDX-License-Identifier: MIT

//! Human-readable rendering of probe results.

use core::fmt;

use diskpart::PartitionKind;

use crate::{Info, NestedProbeResult};

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Probed device • size: {} • sector: {} • whole disk: {}",
            pretty_bytes(self.size),
            sep_u64(self.sector_size),
            if self.whole_disk { "yes" } else { "no" },
        )?;

        match &self.probe_result {
            Some(result) => {
                write!(f, "  {}", result.name)?;

                if let Some(label) = &result.label {
                    write!(f, " label={label:?}")?;
                }

                if let Some(uuid) = &result.uuid {
                    write!(f, " uuid={uuid}")?;
                }

                writeln!(f, " ({})", pretty_bytes(result.probed_size))?;
            }
            None => writeln!(f, "  no known format detected")?,
        }

        if self.parts.is_empty() {
            return Ok(());
        }

        writeln!(
            f,
            "  ┌────┬──────────────────────┬──────────────────────────────┬───────────────┬───────────────┬──────────┐"
        )?;
        writeln!(
            f,
            "  | Id | Label                | Type                         | Offset        | Size          | Contents |"
        )?;
        writeln!(
            f,
            "  ├────┼──────────────────────┼──────────────────────────────┼───────────────┼───────────────┼──────────┤"
        )?;

        for part in &self.parts {
            write_partition_row(f, part)?;
        }

        writeln!(
            f,
            "  └────┴──────────────────────┴──────────────────────────────┴───────────────┴───────────────┴──────────┘"
        )
    }
}

fn write_partition_row(f: &mut fmt::Formatter<'_>, part: &NestedProbeResult) -> fmt::Result {
    let label = part.partition_label.as_deref().unwrap_or("");

    let kind = part
        .partition_type
        .map(|guid| PartitionKind::from_type_guid(guid).to_string())
        .unwrap_or_default();

    let contents = part
        .probe_result
        .as_ref()
        .map(|r| r.name)
        .unwrap_or_default();

    writeln!(
        f,
        "  | {:<2} | {:<20} | {:<28} | {:>13} | {:>13} | {:<8} |",
        part.partition_index,
        truncate(label, 20),
        truncate(&kind, 28),
        pretty_bytes(part.partition_offset),
        pretty_bytes(part.partition_size),
        contents,
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn pretty_bytes(n: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    let mut val = n as f64;
    let mut idx = 0;

    while val >= 1024.0 && idx + 1 < UNITS.len() {
        val /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{} {}", sep_u64(n), UNITS[idx])
    } else {
        format!("{:.1} {}", val, UNITS[idx])
    }
}

/// Thousands separated with thin spaces: 12 345 678.
fn sep_u64(mut n: u64) -> String {
    if n < 1_000 {
        return n.to_string();
    }

    let mut parts = Vec::new();

    while n >= 1_000 {
        parts.push(format!("{:03}", n % 1_000));
        n /= 1_000;
    }

    parts.push(n.to_string());
    parts.reverse();

    parts.join(" ")
}
