use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Clone, Debug, Subcommand)]
pub enum Report {
    /// List the global variables in an ELF binary's symbol table.
    Globals {
        // Path to the ELF binary
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Show the per-section address spans that cover every global.
    Sections {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Flatten struct-typed variables into fields with byte offsets.
    Fields {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// List the structure types defined in the debug info.
    Structs {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Read bytes from a running process at a link-time address.
    Peek {
        // Name of the running binary, resolved with pidof
        #[arg(short = 'b', long = "bin")]
        bin: String,
        // Link-time virtual address; 0x prefix for hex
        #[arg(short = 'a', long = "addr", value_parser = parse_addr)]
        addr: u64,
        // Number of bytes to read
        #[arg(short = 'n', long = "len", default_value_t = 4)]
        len: usize,
    },
    /// Write a little-endian u32 into a running process.
    Poke {
        #[arg(short = 'b', long = "bin")]
        bin: String,
        #[arg(short = 'a', long = "addr", value_parser = parse_addr)]
        addr: u64,
        #[arg(short = 'v', long = "value")]
        value: u32,
    },
}

#[derive(Clone, Debug, Parser)]
#[command(
    version,
    about = "procpeek: inspect global structs in ELF binaries and live processes"
)]
pub struct Options {
    #[command(subcommand)]
    pub report: Report,
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{s:?} is not a valid address: {e}"))
}
