//! # Debug-Entry Tree Builder
//!
//! Decodes `.debug_info` into an arena of [`DebugEntry`] values.
//!
//! ## Layout
//!
//! Entries live in a flat `Vec` in document order and are addressed by
//! [`EntryId`]. Parent, child and type links are ids, so the tree has no
//! owning cycles and can be shared freely once built.
//!
//! ## Passes
//!
//! 1. For every compilation unit, decode the abbreviation table it names and
//!    read entries until the end of the unit. A zero code closes the current
//!    sibling list.
//! 2. Once every unit is read, link each `DW_AT_type` reference to the entry
//!    starting at that section offset, or mark it unresolved.

use std::collections::HashMap;

use gimli::constants::{self, DwAt, DwForm, DwTag};
use tracing::{debug, trace};

use super::abbrev::AbbreviationTable;
use crate::error::{Result, WasmDbgError};
use crate::reader::{ByteReader, Endian, cstring_at};

/// `DW_OP_plus_uconst`, the only operation producers use for member offsets.
const DW_OP_PLUS_UCONST: u8 = 0x23;

/// The three sections the tree builder reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugSections<'a>
{
    pub info: &'a [u8],
    pub abbrev: &'a [u8],
    pub str: &'a [u8],
}

/// Index of an entry in an [`EntryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(usize);

impl EntryId
{
    /// Position in document order.
    pub fn index(self) -> usize
    {
        self.0
    }
}

/// Decoded value of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue
{
    /// `data*`, `udata`, `sec_offset`
    Unsigned(u64),
    /// `sdata`
    Signed(i64),
    /// `addr`, and `high_pc` after conversion to an absolute address
    Address(u64),
    /// Any `ref*` form, converted to a `.debug_info` offset
    Reference(u64),
    /// `string` or `strp`
    String(String),
    /// `block*` and `exprloc`
    Block(Vec<u8>),
    /// `flag` or `flag_present`
    Flag(bool),
    /// `ref_sig8`
    Signature(u64),
}

impl AttributeValue
{
    /// Integer view of the value, if it has one.
    pub fn as_u64(&self) -> Option<u64>
    {
        match self {
            AttributeValue::Unsigned(value)
            | AttributeValue::Address(value)
            | AttributeValue::Reference(value)
            | AttributeValue::Signature(value) => Some(*value),
            AttributeValue::Signed(value) => u64::try_from(*value).ok(),
            AttributeValue::Flag(value) => Some(u64::from(*value)),
            AttributeValue::String(_) | AttributeValue::Block(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str>
    {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }
}

/// Target of a `DW_AT_type` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef
{
    Resolved(EntryId),
    /// No entry starts at this `.debug_info` offset
    Unresolved(u64),
}

/// One debug information entry.
#[derive(Debug, Clone)]
pub struct DebugEntry
{
    /// Section offset of the entry's abbreviation code
    pub offset: u64,
    pub tag: DwTag,
    /// Attributes in declaration order
    pub attributes: Vec<(DwAt, AttributeValue)>,
    pub children: Vec<EntryId>,
    pub parent: Option<EntryId>,
    /// Nesting level inside its unit (the unit entry is 0)
    pub depth: usize,
    pub resolved_type: Option<TypeRef>,
}

impl DebugEntry
{
    pub fn attr(&self, name: DwAt) -> Option<&AttributeValue>
    {
        self.attributes
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, value)| value)
    }

    pub fn attr_u64(&self, name: DwAt) -> Option<u64>
    {
        self.attr(name).and_then(AttributeValue::as_u64)
    }

    pub fn attr_str(&self, name: DwAt) -> Option<&str>
    {
        self.attr(name).and_then(AttributeValue::as_str)
    }

    /// `DW_AT_name`
    pub fn name(&self) -> Option<&str>
    {
        self.attr_str(constants::DW_AT_name)
    }

    pub fn byte_size(&self) -> Option<u64>
    {
        self.attr_u64(constants::DW_AT_byte_size)
    }

    /// `DW_AT_data_member_location` as a byte offset.
    ///
    /// Accepts the constant form and the single `DW_OP_plus_uconst`
    /// expression older producers emit.
    pub fn member_offset(&self) -> Option<u64>
    {
        match self.attr(constants::DW_AT_data_member_location)? {
            AttributeValue::Block(expr) => match expr.split_first() {
                Some((&DW_OP_PLUS_UCONST, operand)) => ByteReader::new(operand).read_uleb128().ok(),
                _ => None,
            },
            other => other.as_u64(),
        }
    }
}

/// Header of one compilation unit.
#[derive(Debug, Clone)]
pub struct UnitHeader
{
    /// Section offset of the unit length field
    pub offset: u64,
    pub unit_length: u32,
    pub version: u16,
    pub abbrev_offset: u32,
    pub address_size: u8,
    /// Top-level entry (normally `DW_TAG_compile_unit`)
    pub root: Option<EntryId>,
}

/// All entries of `.debug_info`.
#[derive(Debug, Clone, Default)]
pub struct EntryTree
{
    entries: Vec<DebugEntry>,
    by_offset: HashMap<u64, EntryId>,
    units: Vec<UnitHeader>,
}

impl EntryTree
{
    /// Decode every unit of `.debug_info` and resolve type references.
    pub fn parse(sections: DebugSections<'_>) -> Result<Self>
    {
        let mut tree = Self::default();
        let mut tables: HashMap<u32, AbbreviationTable> = HashMap::new();
        let mut reader = ByteReader::new(sections.info);

        while !reader.is_empty() {
            let mut header = read_unit_header(&mut reader)?;
            let unit_end = header.offset as usize + 4 + header.unit_length as usize;
            if unit_end > sections.info.len() {
                return Err(WasmDbgError::OutOfBounds {
                    offset: header.offset as usize,
                    needed: header.unit_length as usize + 4,
                    available: sections.info.len(),
                });
            }

            if !tables.contains_key(&header.abbrev_offset) {
                let table = AbbreviationTable::parse(sections.abbrev, header.abbrev_offset as usize)?;
                debug!(
                    "Abbreviation table at 0x{:x} has {} code(s)",
                    header.abbrev_offset,
                    table.len()
                );
                tables.insert(header.abbrev_offset, table);
            }
            let table = &tables[&header.abbrev_offset];

            let unit = UnitContext {
                start: header.offset,
                version: header.version,
                address_size: header.address_size,
                strings: sections.str,
            };
            let first = tree.entries.len();
            // Entries may not run past their unit
            let mut entries = ByteReader::new(&sections.info[..unit_end]);
            entries.seek(reader.position())?;
            tree.read_entries(&mut entries, table, &unit)?;
            if first < tree.entries.len() {
                header.root = Some(EntryId(first));
            }
            trace!(
                "Unit at 0x{:x} (v{}) holds {} entries",
                header.offset,
                header.version,
                tree.entries.len() - first
            );
            tree.units.push(header);
            reader.seek(unit_end)?;
        }

        tree.resolve_types();
        debug!("Decoded {} debug entries in {} unit(s)", tree.entries.len(), tree.units.len());
        Ok(tree)
    }

    fn read_entries(&mut self, reader: &mut ByteReader<'_>, table: &AbbreviationTable, unit: &UnitContext<'_>) -> Result<()>
    {
        let mut parents: Vec<EntryId> = Vec::new();
        while !reader.is_empty() {
            let offset = reader.position() as u64;
            let code = reader.read_uleb128()?;
            if code == 0 {
                parents.pop();
                continue;
            }
            let abbreviation = table
                .get(code)
                .ok_or(WasmDbgError::UnknownAbbreviation { code, offset })?;

            let mut attributes: Vec<(DwAt, AttributeValue)> = Vec::with_capacity(abbreviation.attributes.len());
            for spec in &abbreviation.attributes {
                let (form, mut value) = read_form(reader, spec.form, unit)?;
                if spec.name == constants::DW_AT_high_pc && is_constant_form(form) {
                    let low_pc = attributes
                        .iter()
                        .find(|(name, _)| *name == constants::DW_AT_low_pc)
                        .and_then(|(_, low)| low.as_u64());
                    if let (Some(low_pc), Some(length)) = (low_pc, value.as_u64()) {
                        value = AttributeValue::Address(low_pc.wrapping_add(length));
                    }
                }
                attributes.push((spec.name, value));
            }

            let id = EntryId(self.entries.len());
            let parent = parents.last().copied();
            self.entries.push(DebugEntry {
                offset,
                tag: abbreviation.tag,
                attributes,
                children: Vec::new(),
                parent,
                depth: parents.len(),
                resolved_type: None,
            });
            if let Some(parent) = parent {
                self.entries[parent.0].children.push(id);
            }
            self.by_offset.insert(offset, id);
            if abbreviation.has_children {
                parents.push(id);
            }
        }
        Ok(())
    }

    fn resolve_types(&mut self)
    {
        for index in 0..self.entries.len() {
            let target = match self.entries[index].attr(constants::DW_AT_type) {
                Some(AttributeValue::Reference(offset) | AttributeValue::Unsigned(offset)) => *offset,
                _ => continue,
            };
            let resolved = match self.by_offset.get(&target) {
                Some(id) => TypeRef::Resolved(*id),
                None => {
                    trace!("Type reference 0x{target:x} does not match any entry");
                    TypeRef::Unresolved(target)
                }
            };
            self.entries[index].resolved_type = Some(resolved);
        }
    }

    pub fn get(&self, id: EntryId) -> Option<&DebugEntry>
    {
        self.entries.get(id.0)
    }

    /// Entry starting at `offset` in `.debug_info`.
    pub fn at_offset(&self, offset: u64) -> Option<EntryId>
    {
        self.by_offset.get(&offset).copied()
    }

    /// All entries in document order.
    pub fn entries(&self) -> &[DebugEntry]
    {
        &self.entries
    }

    /// `(id, entry)` pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &DebugEntry)>
    {
        self.entries.iter().enumerate().map(|(index, entry)| (EntryId(index), entry))
    }

    pub fn units(&self) -> &[UnitHeader]
    {
        &self.units
    }

    /// Top-level entries of every unit.
    pub fn roots(&self) -> impl Iterator<Item = EntryId> + '_
    {
        self.units.iter().filter_map(|unit| unit.root)
    }

    /// Children of `id`, in order.
    pub fn children(&self, id: EntryId) -> impl Iterator<Item = (EntryId, &DebugEntry)>
    {
        self.get(id)
            .map(|entry| entry.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|child| (*child, &self.entries[child.0]))
    }

    /// Entry linked through `DW_AT_type`, when it resolved.
    pub fn type_of(&self, id: EntryId) -> Option<&DebugEntry>
    {
        match self.get(id)?.resolved_type? {
            TypeRef::Resolved(target) => self.get(target),
            TypeRef::Unresolved(_) => None,
        }
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

struct UnitContext<'a>
{
    start: u64,
    version: u16,
    address_size: u8,
    strings: &'a [u8],
}

fn read_unit_header(reader: &mut ByteReader<'_>) -> Result<UnitHeader>
{
    let offset = reader.position() as u64;
    let unit_length = reader.read_u32()?;
    if unit_length == 0xffff_ffff {
        return Err(WasmDbgError::MalformedModule("64-bit DWARF units are not supported".to_string()));
    }
    let version = reader.read_u16()?;
    if !(2..=4).contains(&version) {
        return Err(WasmDbgError::UnsupportedUnitVersion(version));
    }
    let abbrev_offset = reader.read_u32()?;
    let address_size = reader.read_u8()?;
    Ok(UnitHeader {
        offset,
        unit_length,
        version,
        abbrev_offset,
        address_size,
        root: None,
    })
}

fn is_constant_form(form: DwForm) -> bool
{
    matches!(
        form,
        constants::DW_FORM_data1
            | constants::DW_FORM_data2
            | constants::DW_FORM_data4
            | constants::DW_FORM_data8
            | constants::DW_FORM_udata
            | constants::DW_FORM_sdata
    )
}

fn read_len(reader: &mut ByteReader<'_>, size: usize) -> Result<usize>
{
    let len = reader.read_uint(size, Endian::Little)?;
    usize::try_from(len).map_err(|_| WasmDbgError::MalformedModule(format!("block length {len}")))
}

/// Decode one attribute value. The returned form is the one actually read,
/// which differs from `form` for `DW_FORM_indirect`.
fn read_form(reader: &mut ByteReader<'_>, form: DwForm, unit: &UnitContext<'_>) -> Result<(DwForm, AttributeValue)>
{
    let value = match form {
        constants::DW_FORM_addr => {
            AttributeValue::Address(reader.read_uint(usize::from(unit.address_size), Endian::Little)?)
        }
        constants::DW_FORM_block1 => {
            let len = read_len(reader, 1)?;
            AttributeValue::Block(reader.read_block(len)?.to_vec())
        }
        constants::DW_FORM_block2 => {
            let len = read_len(reader, 2)?;
            AttributeValue::Block(reader.read_block(len)?.to_vec())
        }
        constants::DW_FORM_block4 => {
            let len = read_len(reader, 4)?;
            AttributeValue::Block(reader.read_block(len)?.to_vec())
        }
        constants::DW_FORM_block | constants::DW_FORM_exprloc => {
            let len = reader.read_uleb128()? as usize;
            AttributeValue::Block(reader.read_block(len)?.to_vec())
        }
        constants::DW_FORM_data1 => AttributeValue::Unsigned(u64::from(reader.read_u8()?)),
        constants::DW_FORM_data2 => AttributeValue::Unsigned(u64::from(reader.read_u16()?)),
        constants::DW_FORM_data4 => AttributeValue::Unsigned(u64::from(reader.read_u32()?)),
        constants::DW_FORM_data8 => AttributeValue::Unsigned(reader.read_u64()?),
        constants::DW_FORM_sdata => AttributeValue::Signed(reader.read_sleb128()?),
        constants::DW_FORM_udata => AttributeValue::Unsigned(reader.read_uleb128()?),
        constants::DW_FORM_string => AttributeValue::String(reader.read_cstring()?),
        constants::DW_FORM_strp => {
            let offset = reader.read_u32()?;
            AttributeValue::String(cstring_at(unit.strings, offset as usize)?)
        }
        constants::DW_FORM_flag => AttributeValue::Flag(reader.read_u8()? != 0),
        constants::DW_FORM_flag_present => AttributeValue::Flag(true),
        constants::DW_FORM_ref1 => AttributeValue::Reference(unit.start + u64::from(reader.read_u8()?)),
        constants::DW_FORM_ref2 => AttributeValue::Reference(unit.start + u64::from(reader.read_u16()?)),
        constants::DW_FORM_ref4 => AttributeValue::Reference(unit.start + u64::from(reader.read_u32()?)),
        constants::DW_FORM_ref8 => AttributeValue::Reference(unit.start.wrapping_add(reader.read_u64()?)),
        constants::DW_FORM_ref_udata => AttributeValue::Reference(unit.start.wrapping_add(reader.read_uleb128()?)),
        constants::DW_FORM_ref_addr => {
            // DWARF 2 sized these like addresses, later versions like offsets
            let size = if unit.version == 2 { usize::from(unit.address_size) } else { 4 };
            AttributeValue::Reference(reader.read_uint(size, Endian::Little)?)
        }
        constants::DW_FORM_ref_sig8 => AttributeValue::Signature(reader.read_u64()?),
        constants::DW_FORM_sec_offset => AttributeValue::Unsigned(u64::from(reader.read_u32()?)),
        constants::DW_FORM_indirect => {
            let actual = reader.read_uleb128()?;
            let actual = u16::try_from(actual).map_err(|_| WasmDbgError::UnsupportedForm(actual))?;
            if actual == constants::DW_FORM_indirect.0 {
                return Err(WasmDbgError::UnsupportedForm(u64::from(actual)));
            }
            return read_form(reader, DwForm(actual), unit);
        }
        other => return Err(WasmDbgError::UnsupportedForm(u64::from(other.0))),
    };
    Ok((form, value))
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn unit(abbrev_offset: u32, body: &[u8]) -> Vec<u8>
    {
        let mut out = ((body.len() + 7) as u32).to_le_bytes().to_vec();
        out.extend(4u16.to_le_bytes());
        out.extend(abbrev_offset.to_le_bytes());
        out.push(4);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_nested_entries_and_references()
    {
        // 1: compile_unit, children; 2: variable name string, type ref4; 3: base_type name string
        let abbrev = [1, 0x11, 1, 0, 0, 2, 0x34, 0, 0x03, 0x08, 0x49, 0x13, 0, 0, 3, 0x24, 0, 0x03, 0x08, 0, 0, 0];
        // offsets: unit header 11 bytes, cu at 11, variable at 12, base_type at 19
        let body = [1, 2, b'x', 0, 19, 0, 0, 0, 3, b'i', b'n', b't', 0, 0];
        let info = unit(0, &body);

        let tree = EntryTree::parse(DebugSections {
            info: &info,
            abbrev: &abbrev,
            str: &[],
        })
        .unwrap();

        assert_eq!(tree.len(), 3);
        let root = tree.roots().next().unwrap();
        let children: Vec<_> = tree.children(root).map(|(id, _)| id).collect();
        assert_eq!(children.len(), 2);

        let variable = tree.get(children[0]).unwrap();
        assert_eq!(variable.offset, 12);
        assert_eq!(variable.depth, 1);
        assert_eq!(variable.parent, Some(root));
        assert_eq!(tree.type_of(children[0]).and_then(DebugEntry::name), Some("int"));
    }

    #[test]
    fn test_unknown_code_is_an_error()
    {
        let abbrev = [1, 0x11, 0, 0, 0, 0];
        let info = unit(0, &[7]);
        let err = EntryTree::parse(DebugSections {
            info: &info,
            abbrev: &abbrev,
            str: &[],
        })
        .unwrap_err();
        assert!(matches!(err, WasmDbgError::UnknownAbbreviation { code: 7, offset: 11 }));
    }

    #[test]
    fn test_indirect_and_strp_forms()
    {
        // 1: subprogram, name indirect
        let abbrev = [1, 0x2e, 0, 0x03, 0x16, 0, 0, 0];
        // indirect -> strp (0x0e) at offset 4
        let info = unit(0, &[1, 0x0e, 4, 0, 0, 0]);
        let tree = EntryTree::parse(DebugSections {
            info: &info,
            abbrev: &abbrev,
            str: b"abc\0main\0",
        })
        .unwrap();
        assert_eq!(tree.entries()[0].name(), Some("main"));
    }

    #[test]
    fn test_high_pc_length_through_indirect_form()
    {
        // 1: subprogram, low_pc addr, high_pc indirect
        let abbrev = [1, 0x2e, 0, 0x11, 0x01, 0x12, 0x16, 0, 0, 0];
        // low_pc 0x10, high_pc indirect -> data4 length 6
        let info = unit(0, &[1, 0x10, 0, 0, 0, 0x06, 6, 0, 0, 0]);
        let tree = EntryTree::parse(DebugSections {
            info: &info,
            abbrev: &abbrev,
            str: &[],
        })
        .unwrap();
        assert_eq!(
            tree.entries()[0].attr(constants::DW_AT_high_pc),
            Some(&AttributeValue::Address(0x16))
        );
    }

    #[test]
    fn test_entry_cannot_cross_unit_end()
    {
        // 1: variable, byte_size data4
        let abbrev = [1, 0x34, 0, 0x0b, 0x06, 0, 0, 0];
        // The unit ends two bytes into the data4 value
        let mut info = unit(0, &[1, 4, 0]);
        info.extend([0, 0, 0, 0]);
        let err = EntryTree::parse(DebugSections {
            info: &info,
            abbrev: &abbrev,
            str: &[],
        })
        .unwrap_err();
        assert!(matches!(err, WasmDbgError::OutOfBounds { .. }), "{err:?}");
    }

    #[test]
    fn test_member_offset_expression()
    {
        let entry = DebugEntry {
            offset: 0,
            tag: constants::DW_TAG_member,
            attributes: vec![(
                constants::DW_AT_data_member_location,
                AttributeValue::Block(vec![DW_OP_PLUS_UCONST, 0x88, 0x01]),
            )],
            children: Vec::new(),
            parent: None,
            depth: 0,
            resolved_type: None,
        };
        assert_eq!(entry.member_offset(), Some(136));
    }
}
