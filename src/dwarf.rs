//! DWARF struct-layout inspection.
//!
//! Flattens struct-typed variables in an ELF binary's debug info into
//! dotted field paths with byte offsets, so an external reader can
//! locate any field of a global record inside a live process.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use gimli::{
    AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, Reader as _,
    RunTimeEndian, Unit, UnitOffset,
};
use object::{Object, ObjectSection};
use tracing::trace;

use crate::elf::ElfImage;

type Reader = EndianArcSlice<RunTimeEndian>;

/// Typedef/qualifier chains longer than this are treated as having no
/// resolvable target rather than looping forever on malformed DWARF.
const MAX_TYPE_CHAIN: usize = 32;

/// One leaf field of a struct-typed variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    /// Name of the variable this field belongs to.
    pub base: String,
    /// Dotted path from the variable down to this field,
    /// e.g. `GLOBAL_RECORD.inner.inner_int`.
    pub path: String,
    /// Offset in bytes from the variable's base address.
    pub offset: u64,
    /// Size in bytes of the field's data, when the type records one.
    pub size: Option<u64>,
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructMember {
    pub name: String,
    pub offset: u64,
    pub size: Option<u64>,
    pub type_name: Option<String>,
}

/// A named structure type and its immediate members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<StructMember>,
}

/// Walks the debug info for variables of struct type and flattens each
/// into its leaf fields, recursing through nested structs and
/// accumulating member offsets along the way.
pub fn struct_fields(image: &ElfImage) -> Result<Vec<FieldInfo>> {
    let dwarf = load_dwarf(image)?;
    let mut fields = Vec::new();

    let mut units = dwarf.units();
    while let Some(header) = units.next().context("reading unit header")? {
        let unit = dwarf.unit(header).context("parsing compilation unit")?;
        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs().context("walking DIE tree")? {
            if entry.tag() != gimli::DW_TAG_variable {
                continue;
            }
            let Some(name) = entry_name(&dwarf, &unit, entry)? else {
                continue;
            };
            let Some(type_ref) = entry_type_ref(entry)? else {
                continue;
            };
            let Some(struct_offset) = resolve_struct(&unit, type_ref)? else {
                continue;
            };
            collect_members(&dwarf, &unit, struct_offset, &name, &name, 0, &mut fields)?;
        }
    }

    trace!("flattened {} struct fields", fields.len());
    Ok(fields)
}

/// Lists every named structure type in the debug info with its
/// immediate members. Declaration-only DIEs are skipped; duplicate
/// definitions across compilation units collapse by name.
pub fn struct_defs(image: &ElfImage) -> Result<Vec<StructDef>> {
    let dwarf = load_dwarf(image)?;
    let mut defs: BTreeMap<String, StructDef> = BTreeMap::new();

    let mut units = dwarf.units();
    while let Some(header) = units.next().context("reading unit header")? {
        let unit = dwarf.unit(header).context("parsing compilation unit")?;
        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs().context("walking DIE tree")? {
            if entry.tag() != gimli::DW_TAG_structure_type {
                continue;
            }
            if matches!(
                entry
                    .attr_value(gimli::DW_AT_declaration)
                    .context("reading DW_AT_declaration")?,
                Some(AttributeValue::Flag(true))
            ) {
                continue;
            }
            let Some(name) = entry_name(&dwarf, &unit, entry)? else {
                continue;
            };
            if defs.contains_key(&name) {
                continue;
            }
            let members = immediate_members(&dwarf, &unit, entry.offset())?;
            defs.insert(name.clone(), StructDef { name, members });
        }
    }

    Ok(defs.into_values().collect())
}

fn load_dwarf(image: &ElfImage) -> Result<Dwarf<Reader>> {
    let file = image.object()?;
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    Dwarf::load(|id| -> std::result::Result<Reader, gimli::Error> {
        // A missing (or unreadable) section is an empty one; gimli
        // reports the absence when the section is actually needed.
        let data = match file.section_by_name(id.name()) {
            Some(section) => section
                .uncompressed_data()
                .unwrap_or(Cow::Borrowed(&[]))
                .into_owned(),
            None => Vec::new(),
        };
        Ok(EndianArcSlice::new(Arc::from(data), endian))
    })
    .context("loading DWARF sections")
}

fn collect_members(
    dwarf: &Dwarf<Reader>,
    unit: &Unit<Reader>,
    struct_offset: UnitOffset,
    base: &str,
    path: &str,
    offset: u64,
    out: &mut Vec<FieldInfo>,
) -> Result<()> {
    let mut tree = unit
        .entries_tree(Some(struct_offset))
        .context("opening struct DIE")?;
    let root = tree.root().context("reading struct DIE")?;
    let mut children = root.children();

    while let Some(child) = children.next().context("iterating struct members")? {
        let entry = child.entry();
        if entry.tag() != gimli::DW_TAG_member {
            continue;
        }
        let Some(name) = entry_name(dwarf, unit, entry)? else {
            continue;
        };
        let Some(type_ref) = entry_type_ref(entry)? else {
            continue;
        };
        let member_offset = entry
            .attr(gimli::DW_AT_data_member_location)
            .context("reading member offset")?
            .and_then(|attr| attr.udata_value())
            .unwrap_or(0);
        let field_path = format!("{path}.{name}");

        match resolve_struct(unit, type_ref)? {
            // Drop down into the next level of struct.
            Some(sub) => collect_members(
                dwarf,
                unit,
                sub,
                base,
                &field_path,
                offset + member_offset,
                out,
            )?,
            None => out.push(FieldInfo {
                base: base.to_string(),
                path: field_path,
                offset: offset + member_offset,
                size: type_byte_size(unit, type_ref)?,
                type_name: type_name(dwarf, unit, type_ref, MAX_TYPE_CHAIN)?,
            }),
        }
    }
    Ok(())
}

fn immediate_members(
    dwarf: &Dwarf<Reader>,
    unit: &Unit<Reader>,
    struct_offset: UnitOffset,
) -> Result<Vec<StructMember>> {
    let mut tree = unit
        .entries_tree(Some(struct_offset))
        .context("opening struct DIE")?;
    let root = tree.root().context("reading struct DIE")?;
    let mut children = root.children();
    let mut members = Vec::new();

    while let Some(child) = children.next().context("iterating struct members")? {
        let entry = child.entry();
        if entry.tag() != gimli::DW_TAG_member {
            continue;
        }
        let Some(name) = entry_name(dwarf, unit, entry)? else {
            continue;
        };
        let Some(type_ref) = entry_type_ref(entry)? else {
            continue;
        };
        members.push(StructMember {
            name,
            offset: entry
                .attr(gimli::DW_AT_data_member_location)
                .context("reading member offset")?
                .and_then(|attr| attr.udata_value())
                .unwrap_or(0),
            size: type_byte_size(unit, type_ref)?,
            type_name: type_name(dwarf, unit, type_ref, MAX_TYPE_CHAIN)?,
        });
    }

    Ok(members)
}

/// Follows typedefs and cv-qualifiers from `offset`; returns the DIE
/// offset of the underlying structure type, if that is what this is.
fn resolve_struct(unit: &Unit<Reader>, offset: UnitOffset) -> Result<Option<UnitOffset>> {
    let mut offset = offset;
    for _ in 0..MAX_TYPE_CHAIN {
        let entry = unit.entry(offset).context("looking up type DIE")?;
        match entry.tag() {
            gimli::DW_TAG_structure_type => return Ok(Some(offset)),
            gimli::DW_TAG_typedef | gimli::DW_TAG_const_type | gimli::DW_TAG_volatile_type => {
                match entry_type_ref(&entry)? {
                    Some(next) => offset = next,
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        }
    }
    Ok(None)
}

fn type_byte_size(unit: &Unit<Reader>, offset: UnitOffset) -> Result<Option<u64>> {
    let mut offset = offset;
    for _ in 0..MAX_TYPE_CHAIN {
        let entry = unit.entry(offset).context("looking up type DIE")?;
        if let Some(size) = entry
            .attr(gimli::DW_AT_byte_size)
            .context("reading type size")?
            .and_then(|attr| attr.udata_value())
        {
            return Ok(Some(size));
        }
        match entry_type_ref(&entry)? {
            Some(next) => offset = next,
            None => return Ok(None),
        }
    }
    Ok(None)
}

/// First name along the typedef chain; pointer types render as
/// `*<pointee>`. `depth` bounds the whole walk, pointer recursion
/// included, so reference cycles in malformed DWARF terminate.
fn type_name(
    dwarf: &Dwarf<Reader>,
    unit: &Unit<Reader>,
    offset: UnitOffset,
    depth: usize,
) -> Result<Option<String>> {
    if depth == 0 {
        return Ok(None);
    }
    let entry = unit.entry(offset).context("looking up type DIE")?;
    if let Some(name) = entry_name(dwarf, unit, &entry)? {
        return Ok(Some(name));
    }
    if entry.tag() == gimli::DW_TAG_pointer_type {
        let pointee = match entry_type_ref(&entry)? {
            Some(inner) => type_name(dwarf, unit, inner, depth - 1)?,
            None => None,
        };
        return Ok(Some(format!(
            "*{}",
            pointee.unwrap_or_else(|| "void".to_string())
        )));
    }
    match entry_type_ref(&entry)? {
        Some(next) => type_name(dwarf, unit, next, depth - 1),
        None => Ok(None),
    }
}

fn entry_name(
    dwarf: &Dwarf<Reader>,
    unit: &Unit<Reader>,
    entry: &DebuggingInformationEntry<'_, '_, Reader>,
) -> Result<Option<String>> {
    let Some(attr) = entry.attr(gimli::DW_AT_name).context("reading DW_AT_name")? else {
        return Ok(None);
    };
    let name = dwarf
        .attr_string(unit, attr.value())
        .context("resolving name string")?;
    let name = name.to_string_lossy().context("decoding name string")?;
    Ok(Some(name.into_owned()))
}

fn entry_type_ref(
    entry: &DebuggingInformationEntry<'_, '_, Reader>,
) -> Result<Option<UnitOffset>> {
    match entry
        .attr_value(gimli::DW_AT_type)
        .context("reading DW_AT_type")?
    {
        Some(AttributeValue::UnitRef(offset)) => Ok(Some(offset)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use gimli::write;

    use super::*;

    /// Builds a unit holding two pointer types whose DW_AT_type
    /// attributes reference each other.
    fn cyclic_pointer_dwarf() -> Dwarf<Reader> {
        let encoding = gimli::Encoding {
            format: gimli::Format::Dwarf32,
            version: 4,
            address_size: 8,
        };
        let mut unit = write::DwarfUnit::new(encoding);
        let root = unit.unit.root();
        let ptr_a = unit.unit.add(root, gimli::DW_TAG_pointer_type);
        let ptr_b = unit.unit.add(root, gimli::DW_TAG_pointer_type);
        unit.unit
            .get_mut(ptr_a)
            .set(gimli::DW_AT_type, write::AttributeValue::UnitRef(ptr_b));
        unit.unit
            .get_mut(ptr_b)
            .set(gimli::DW_AT_type, write::AttributeValue::UnitRef(ptr_a));

        let mut sections = write::Sections::new(write::EndianVec::new(gimli::LittleEndian));
        unit.write(&mut sections).expect("writing DWARF sections");

        let mut raw: HashMap<gimli::SectionId, Vec<u8>> = HashMap::new();
        sections
            .for_each(|id, data| -> std::result::Result<(), gimli::Error> {
                raw.insert(id, data.slice().to_vec());
                Ok(())
            })
            .expect("collecting DWARF sections");

        Dwarf::load(|id| -> std::result::Result<Reader, gimli::Error> {
            let data = raw.get(&id).cloned().unwrap_or_default();
            Ok(EndianArcSlice::new(Arc::from(data), RunTimeEndian::Little))
        })
        .expect("loading DWARF sections")
    }

    #[test]
    fn pointer_reference_cycles_terminate() {
        let dwarf = cyclic_pointer_dwarf();
        let mut units = dwarf.units();
        let header = units
            .next()
            .expect("reading unit header")
            .expect("one unit");
        let unit = dwarf.unit(header).expect("parsing unit");

        let mut entries = unit.entries();
        let mut pointer_offset = None;
        while let Some((_, entry)) = entries.next_dfs().expect("walking DIEs") {
            if entry.tag() == gimli::DW_TAG_pointer_type {
                pointer_offset = Some(entry.offset());
                break;
            }
        }
        let offset = pointer_offset.expect("unit should contain a pointer DIE");

        // Must return once the depth budget runs out instead of
        // chasing the a -> b -> a reference loop.
        let name = type_name(&dwarf, &unit, offset, MAX_TYPE_CHAIN)
            .expect("resolving the name must not error")
            .expect("an unnamed pointer still renders as a pointer");
        assert!(name.starts_with('*') && name.ends_with("void"), "{name}");
    }
}
