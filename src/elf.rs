use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind, SymbolSection};
use tracing::trace;

/// A global variable's name, address, and home section, as reported by
/// the symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: String,
    /// Link-time virtual address of the symbol.
    pub address: u64,
    pub size: u64,
    pub section: String,
    /// Link-time virtual address where the section starts.
    pub section_addr: u64,
    /// Offset of the symbol within its section.
    pub section_offset: u64,
}

pub type GlobalVariables = BTreeMap<String, GlobalVariable>;

/// The address span a reader must cover within one section to see
/// every global that lives there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionSpan {
    /// Link-time virtual address where the section starts.
    addr_base: u64,
    /// Lowest address of any global in this section.
    data_start: u64,
    /// One past the highest byte of any global in this section.
    data_end: u64,
}

impl SectionSpan {
    /// Address where this section starts.
    pub fn addr(&self) -> u64 {
        self.addr_base
    }

    /// Address where the required data in this section starts.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Number of bytes needed from this section.
    pub fn size(&self) -> u64 {
        self.data_end - self.data_start
    }
}

/// An ELF binary on disk, loaded into memory for inspection.
pub struct ElfImage {
    path: PathBuf,
    data: Vec<u8>,
}

impl ElfImage {
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        // Fail now, not on first query, if this isn't an object file.
        object::File::parse(&*data)
            .with_context(|| format!("parsing {} as an object file", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn object(&self) -> Result<object::File<'_>> {
        object::File::parse(&*self.data)
            .with_context(|| format!("parsing {} as an object file", self.path.display()))
    }

    /// Extracts the global variables from the symbol table: data
    /// symbols with global binding that live in `.data` or `.bss`.
    /// Toolchain-internal symbols (leading `__`) are skipped. Stripped
    /// binaries carry no `.symtab`, so their exported globals are read
    /// from the dynamic table instead.
    pub fn globals(&self) -> Result<GlobalVariables> {
        let file = self.object()?;
        let symbols = if file.symbol_table().is_some() {
            file.symbols()
        } else {
            file.dynamic_symbols()
        };
        let mut globals = GlobalVariables::new();

        for sym in symbols {
            if sym.kind() != SymbolKind::Data || !sym.is_global() {
                continue;
            }
            let name = sym.name().context("reading symbol name")?;
            if name.is_empty() || name.starts_with("__") {
                continue;
            }

            let SymbolSection::Section(section_index) = sym.section() else {
                continue;
            };
            let section = file
                .section_by_index(section_index)
                .context("resolving symbol's section")?;
            let section_name = section.name().context("reading section name")?;
            if section_name != ".data" && section_name != ".bss" {
                continue;
            }

            globals.insert(
                name.to_string(),
                GlobalVariable {
                    name: name.to_string(),
                    address: sym.address(),
                    size: sym.size(),
                    section: section_name.to_string(),
                    section_addr: section.address(),
                    section_offset: sym.address() - section.address(),
                },
            );
        }

        trace!("found {} globals in {}", globals.len(), self.path.display());
        Ok(globals)
    }
}

/// Folds the globals into per-section spans: the minimal windows an
/// external reader must map to see every global variable.
pub fn required_sections(globals: &GlobalVariables) -> BTreeMap<String, SectionSpan> {
    let mut spans: BTreeMap<String, SectionSpan> = BTreeMap::new();

    for global in globals.values() {
        let span = spans
            .entry(global.section.clone())
            .or_insert_with(|| SectionSpan {
                addr_base: global.section_addr,
                data_start: global.address,
                data_end: global.address + global.size,
            });

        if global.address < span.data_start {
            span.data_start = global.address;
        }
        let end = global.address + global.size;
        if end > span.data_end {
            span.data_end = end;
        }
    }

    spans
}
