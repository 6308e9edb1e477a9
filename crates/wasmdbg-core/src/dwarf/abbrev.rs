//! Abbreviation table decoding (`.debug_abbrev`).

use std::collections::HashMap;

use gimli::constants::{self, DwAt, DwForm, DwTag};

use crate::error::{Result, WasmDbgError};
use crate::reader::ByteReader;

/// Attribute specification of an abbreviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec
{
    pub name: DwAt,
    pub form: DwForm,
}

/// Template for debug entries sharing a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation
{
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AttributeSpec>,
}

/// Code → abbreviation map of one table.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable
{
    entries: HashMap<u64, Abbreviation>,
}

impl AbbreviationTable
{
    /// Decode the table starting at `offset` in `.debug_abbrev`.
    ///
    /// Reading stops at the zero code that ends the table (or at the end of
    /// the section). Duplicate codes and forms this crate cannot decode are
    /// rejected up front, so entry decoding never meets an unknown form.
    pub fn parse(section: &[u8], offset: usize) -> Result<Self>
    {
        let mut reader = ByteReader::new(section);
        reader.seek(offset)?;

        let mut entries = HashMap::new();
        while !reader.is_empty() {
            let code = reader.read_uleb128()?;
            if code == 0 {
                break;
            }
            let tag = DwTag(read_u16_constant(&mut reader, "tag")?);
            let has_children = reader.read_u8()? != 0;

            let mut attributes = Vec::new();
            loop {
                let name = read_u16_constant(&mut reader, "attribute")?;
                let form = reader.read_uleb128()?;
                if name == 0 && form == 0 {
                    break;
                }
                if !is_supported_form(form) {
                    return Err(WasmDbgError::UnsupportedForm(form));
                }
                attributes.push(AttributeSpec {
                    name: DwAt(name),
                    form: DwForm(form as u16),
                });
            }

            let abbreviation = Abbreviation {
                code,
                tag,
                has_children,
                attributes,
            };
            if entries.insert(code, abbreviation).is_some() {
                return Err(WasmDbgError::DuplicateAbbreviation(code));
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, code: u64) -> Option<&Abbreviation>
    {
        self.entries.get(&code)
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

fn read_u16_constant(reader: &mut ByteReader<'_>, what: &str) -> Result<u16>
{
    let value = reader.read_uleb128()?;
    u16::try_from(value).map_err(|_| WasmDbgError::MalformedModule(format!("{what} {value} exceeds 16 bits")))
}

/// Forms decoded by [`crate::dwarf::info`].
pub(crate) fn is_supported_form(form: u64) -> bool
{
    let Ok(form) = u16::try_from(form) else {
        return false;
    };
    matches!(
        DwForm(form),
        constants::DW_FORM_addr
            | constants::DW_FORM_block1
            | constants::DW_FORM_block2
            | constants::DW_FORM_block4
            | constants::DW_FORM_block
            | constants::DW_FORM_exprloc
            | constants::DW_FORM_data1
            | constants::DW_FORM_data2
            | constants::DW_FORM_data4
            | constants::DW_FORM_data8
            | constants::DW_FORM_sdata
            | constants::DW_FORM_udata
            | constants::DW_FORM_string
            | constants::DW_FORM_strp
            | constants::DW_FORM_flag
            | constants::DW_FORM_flag_present
            | constants::DW_FORM_ref1
            | constants::DW_FORM_ref2
            | constants::DW_FORM_ref4
            | constants::DW_FORM_ref8
            | constants::DW_FORM_ref_udata
            | constants::DW_FORM_ref_addr
            | constants::DW_FORM_ref_sig8
            | constants::DW_FORM_sec_offset
            | constants::DW_FORM_indirect
    )
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_two_abbreviations()
    {
        let section = [
            1, 0x11, 1, 0x03, 0x08, 0x25, 0x0e, 0, 0, // compile_unit, name string, producer strp
            2, 0x24, 0, 0x0b, 0x0b, 0, 0, // base_type, byte_size data1
            0,
        ];
        let table = AbbreviationTable::parse(&section, 0).unwrap();
        assert_eq!(table.len(), 2);

        let unit = table.get(1).unwrap();
        assert_eq!(unit.tag, constants::DW_TAG_compile_unit);
        assert!(unit.has_children);
        assert_eq!(unit.attributes[1].name, constants::DW_AT_producer);
        assert_eq!(unit.attributes[1].form, constants::DW_FORM_strp);

        assert!(!table.get(2).unwrap().has_children);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_unknown_form_is_rejected()
    {
        // DW_FORM_strx1 (0x25) belongs to DWARF 5
        let section = [1, 0x2e, 0, 0x03, 0x25, 0, 0, 0];
        let err = AbbreviationTable::parse(&section, 0).unwrap_err();
        assert!(matches!(err, WasmDbgError::UnsupportedForm(0x25)));
    }
}
