use anyhow::Result;
use clap::Parser;
use procpeek::{
    dwarf,
    elf::{ElfImage, required_sections},
    memory::{MapRanges, MemoryReader, ProcVm, pid_of},
    options::{Options, Report},
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reports go to stdout; logging stays on stderr, RUST_LOG-gated.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = Options::parse();
    match options.report {
        Report::Globals { file } => {
            let image = ElfImage::open(&file)?;
            for gv in image.globals()?.values() {
                println!(
                    "Name: {}, Addr: 0x{:X}, Size: {}, SectionAddr: 0x{:X}",
                    gv.name, gv.address, gv.size, gv.section_addr
                );
            }
        }
        Report::Sections { file } => {
            let image = ElfImage::open(&file)?;
            let globals = image.globals()?;
            for (name, span) in required_sections(&globals) {
                println!(
                    "Name: {}, Addr: 0x{:X}, Size: {}",
                    name,
                    span.addr(),
                    span.size()
                );
            }
        }
        Report::Fields { file } => {
            let image = ElfImage::open(&file)?;
            for field in dwarf::struct_fields(&image)? {
                println!(
                    "Field: {} {}, Type: {}, Offset: {}, Size: {}",
                    field.base,
                    field.path,
                    field.type_name.as_deref().unwrap_or("?"),
                    field.offset,
                    fmt_size(field.size)
                );
            }
        }
        Report::Structs { file } => {
            let image = ElfImage::open(&file)?;
            for def in dwarf::struct_defs(&image)? {
                println!("struct: {}", def.name);
                for member in def.members {
                    println!("  field: {}", member.name);
                    println!("    type  : {}", member.type_name.as_deref().unwrap_or("?"));
                    println!("    offset: {}", member.offset);
                    println!("    size  : {}", fmt_size(member.size));
                }
            }
        }
        Report::Peek { bin, addr, len } => {
            let pid = pid_of(&bin)?;
            let ranges = MapRanges::for_pid(pid, &bin)?;
            let vm = ProcVm::new(pid);
            let mut buf = vec![0u8; len];
            vm.read(ranges.rebase(addr), &mut buf)?;
            let bytes: Vec<String> = buf.iter().map(|b| format!("{b:02x}")).collect();
            println!("0x{addr:X}: {}", bytes.join(" "));
        }
        Report::Poke { bin, addr, value } => {
            let pid = pid_of(&bin)?;
            let ranges = MapRanges::for_pid(pid, &bin)?;
            let vm = ProcVm::new(pid);
            let runtime_addr = ranges.rebase(addr);
            vm.write(runtime_addr, &value.to_le_bytes())?;
            // Read back through the same channel so the caller sees
            // what landed.
            let readback = vm.read_i32(runtime_addr)?;
            println!("0x{addr:X}: wrote {value}, read back {readback}");
        }
    }

    Ok(())
}

fn fmt_size(size: Option<u64>) -> String {
    match size {
        Some(n) => n.to_string(),
        None => "?".to_string(),
    }
}
