use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use nix::unistd::Pid;
use tracing::trace;

/// Resolves the PID of a running binary by name via `pidof`. If the
/// binary is running more than once, the first PID wins.
pub fn pid_of(bin_name: &str) -> Result<Pid> {
    let output = Command::new("pidof")
        .arg(bin_name)
        .output()
        .context("running pidof")?;
    if !output.status.success() {
        bail!("could not get the pid of {bin_name}, perhaps it is not running");
    }
    let text = String::from_utf8(output.stdout).context("pidof output is not UTF-8")?;
    let first = text
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow!("pidof printed nothing for {bin_name}"))?;
    let pid: i32 = first
        .parse()
        .with_context(|| format!("pidof gave us {first:?}, and that cannot be parsed as a pid"))?;
    Ok(Pid::from_raw(pid))
}

/// Address ranges of a binary's mappings in a live process, read from
/// `/proc/<pid>/maps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapRanges {
    /// Lowest mapping start for the binary. For a position-independent
    /// executable this is the load base that link-time virtual
    /// addresses are relative to.
    pub base: u64,
    /// Start of the binary's `rw-p` region (its writable data).
    pub rw_start: u64,
    /// End of the binary's `rw-p` region.
    pub rw_end: u64,
}

impl MapRanges {
    pub fn for_pid(pid: Pid, bin_name: &str) -> Result<Self> {
        let path = format!("/proc/{pid}/maps");
        let file = File::open(&path).with_context(|| format!("opening {path}"))?;
        let ranges = Self::parse(BufReader::new(file), bin_name)?;
        trace!(
            "maps for {bin_name}: base 0x{:x} rw 0x{:x}..0x{:x}",
            ranges.base, ranges.rw_start, ranges.rw_end
        );
        Ok(ranges)
    }

    fn parse<R: BufRead>(reader: R, bin_name: &str) -> Result<Self> {
        let mut base = u64::MAX;
        let mut rw_start = 0;
        let mut rw_end = 0;

        for line in reader.lines() {
            let line = line.context("reading maps line")?;
            if !line.contains(bin_name) {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                continue;
            }
            let (start_str, end_str) = fields[0]
                .split_once('-')
                .ok_or_else(|| anyhow!("malformed address range {:?}", fields[0]))?;
            let start = u64::from_str_radix(start_str, 16)
                .with_context(|| format!("parsing mapping start {start_str:?}"))?;
            if start < base {
                base = start;
            }

            if fields[1] != "rw-p" {
                continue;
            }
            rw_start = start;
            rw_end = u64::from_str_radix(end_str, 16)
                .with_context(|| format!("parsing mapping end {end_str:?}"))?;
        }

        if base == u64::MAX {
            bail!("no mappings for {bin_name} in the maps file");
        }
        Ok(Self {
            base,
            rw_start,
            rw_end,
        })
    }

    /// Converts a link-time virtual address to a runtime address.
    pub fn rebase(&self, vaddr: u64) -> u64 {
        self.base + vaddr
    }

    pub fn rw_size(&self) -> u64 {
        self.rw_end - self.rw_start
    }
}
