use std::fs::File;
use std::os::fd::AsFd;

use anyhow::{Context, Result, bail};
use nix::sys::uio::pread;
use nix::unistd::Pid;

use super::MemoryReader;

/// Read-only memory access through positioned reads on
/// `/proc/<pid>/mem`, where the file offset is the target's virtual
/// address. The kernel does not support mmap on this file, so `pread`
/// it is.
pub struct ProcMem {
    pid: Pid,
    mem: File,
}

impl ProcMem {
    pub fn open(pid: Pid) -> Result<Self> {
        let path = format!("/proc/{pid}/mem");
        let mem = File::open(&path).with_context(|| format!("opening {path}"))?;
        Ok(Self { pid, mem })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl MemoryReader for ProcMem {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let n = pread(self.mem.as_fd(), buf, addr as i64)
            .with_context(|| format!("pread /proc/{}/mem at 0x{addr:x}", self.pid))?;
        if n != buf.len() {
            bail!(
                "short read from pid {}: got {n}, want {}",
                self.pid,
                buf.len()
            );
        }
        Ok(())
    }
}
