use std::io::{IoSlice, IoSliceMut};

use anyhow::{Context, Result, bail};
use nix::sys::uio::{RemoteIoVec, process_vm_readv, process_vm_writev};
use nix::unistd::Pid;

use super::MemoryReader;

/// Memory access through `process_vm_readv`/`process_vm_writev`.
/// Requires the same permission as attaching with ptrace; a process we
/// spawned ourselves always qualifies.
pub struct ProcVm {
    pid: Pid,
}

impl ProcVm {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Writes `buf` into the target's memory at absolute address
    /// `addr`. Short writes are errors.
    pub fn write(&self, addr: u64, buf: &[u8]) -> Result<()> {
        let remote = [RemoteIoVec {
            base: addr as usize,
            len: buf.len(),
        }];
        let n = process_vm_writev(self.pid, &[IoSlice::new(buf)], &remote)
            .with_context(|| format!("process_vm_writev into pid {}", self.pid))?;
        if n != buf.len() {
            bail!(
                "short write to pid {}: got {n}, want {}",
                self.pid,
                buf.len()
            );
        }
        Ok(())
    }
}

impl MemoryReader for ProcVm {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let remote = [RemoteIoVec {
            base: addr as usize,
            len,
        }];
        let n = process_vm_readv(self.pid, &mut [IoSliceMut::new(buf)], &remote)
            .with_context(|| format!("process_vm_readv from pid {}", self.pid))?;
        if n != len {
            bail!("short read from pid {}: got {n}, want {len}", self.pid);
        }
        Ok(())
    }
}
