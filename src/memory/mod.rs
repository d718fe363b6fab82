//! Live process memory access.
//!
//! Two backends over the same contract: `ProcVm` goes through the
//! `process_vm_readv`/`process_vm_writev` syscalls, `ProcMem` through
//! positioned reads on `/proc/<pid>/mem`. Both take absolute runtime
//! addresses; `MapRanges::rebase` converts link-time virtual addresses
//! for position-independent executables.

use anyhow::Result;

mod maps;
mod mem;
mod vm;

pub use maps::{MapRanges, pid_of};
pub use mem::ProcMem;
pub use vm::ProcVm;

/// Byte-level read access to another process's memory, with typed
/// little-endian accessors layered on top.
pub trait MemoryReader {
    /// Fills `buf` from the target's memory at absolute address
    /// `addr`. Short reads are errors.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    fn read_u8(&self, addr: u64) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(addr, &mut buf)?;
        Ok(buf[0])
    }

    fn read_i32(&self, addr: u64) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_f64(&self, addr: u64) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }
}
