pub mod dwarf;
pub mod elf;
pub mod memory;
pub mod options;
