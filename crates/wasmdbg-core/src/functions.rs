//! # Function Table
//!
//! Projects the debug entry tree onto a table of functions sorted by start
//! address.
//!
//! The walk is flat, in document order: a `DW_TAG_subprogram` opens a record,
//! each directly following `DW_TAG_formal_parameter` is appended to it, and
//! any other entry closes it. Parameters of nested lexical blocks or inlined
//! subroutines therefore never leak into the enclosing function.

use gimli::constants;
use tracing::debug;

use crate::dwarf::{EntryId, EntryTree, TypeRef};
use crate::index::floor_by_key;
use crate::symbols::make_symbol_name;
use crate::types::{Address, SymbolName};

/// Formal parameter of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter
{
    /// `DW_AT_name`, empty when the producer omitted it
    pub name: String,
    /// The `DW_TAG_formal_parameter` entry
    pub entry: EntryId,
    pub type_ref: Option<TypeRef>,
}

/// One function described by the debug info.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor
{
    pub name: SymbolName,
    /// Declaring file, resolved through the line program's file table
    pub decl_file: Option<String>,
    pub decl_line: Option<u64>,
    pub low_pc: Option<Address>,
    /// Absolute end address (exclusive)
    pub high_pc: Option<Address>,
    pub parameters: Vec<Parameter>,
    /// The `DW_TAG_subprogram` entry
    pub entry: EntryId,
}

impl FunctionDescriptor
{
    /// Whether the function can be found by address.
    ///
    /// Declarations and functions the linker discarded carry no `low_pc` or a
    /// zero one.
    pub fn is_addressable(&self) -> bool
    {
        self.low_pc.is_some_and(|low| low != Address::ZERO)
    }

    fn sort_key(&self) -> Address
    {
        self.low_pc.unwrap_or(Address::ZERO)
    }
}

/// Functions sorted ascending by `low_pc`.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable
{
    functions: Vec<FunctionDescriptor>,
}

impl FunctionTable
{
    /// Build the table from `tree`.
    ///
    /// `file_paths` is the path table of the line program; `DW_AT_decl_file`
    /// indexes it 1-based.
    pub fn build(tree: &EntryTree, file_paths: &[String]) -> Self
    {
        let mut functions = Vec::new();
        let mut pending: Option<FunctionDescriptor> = None;

        for (id, entry) in tree.iter() {
            if entry.tag == constants::DW_TAG_formal_parameter {
                if let Some(function) = pending.as_mut() {
                    function.parameters.push(Parameter {
                        name: entry.name().unwrap_or_default().to_string(),
                        entry: id,
                        type_ref: entry.resolved_type,
                    });
                }
                continue;
            }

            functions.extend(pending.take());
            if entry.tag != constants::DW_TAG_subprogram {
                continue;
            }

            let raw_name = entry
                .name()
                .or_else(|| entry.attr_str(constants::DW_AT_linkage_name))
                .unwrap_or("<unknown>");
            let decl_file = entry
                .attr_u64(constants::DW_AT_decl_file)
                .and_then(|index| index.checked_sub(1))
                .and_then(|slot| usize::try_from(slot).ok())
                .and_then(|slot| file_paths.get(slot).cloned());

            pending = Some(FunctionDescriptor {
                name: make_symbol_name(raw_name.to_string()),
                decl_file,
                decl_line: entry.attr_u64(constants::DW_AT_decl_line),
                low_pc: entry.attr_u64(constants::DW_AT_low_pc).map(Address::new),
                high_pc: entry.attr_u64(constants::DW_AT_high_pc).map(Address::new),
                parameters: Vec::new(),
                entry: id,
            });
        }
        functions.extend(pending);

        // Stable, so entries without an address keep document order
        functions.sort_by_key(FunctionDescriptor::sort_key);
        debug!("Function table holds {} function(s)", functions.len());
        Self { functions }
    }

    /// Function whose `low_pc` is the greatest one `<=` `address`.
    ///
    /// Only the start address is compared, so an address in padding between
    /// two functions resolves to the preceding one.
    pub fn for_address(&self, address: Address) -> Option<&FunctionDescriptor>
    {
        let index = floor_by_key(&self.functions, &address, FunctionDescriptor::sort_key)?;
        let function = &self.functions[index];
        function.is_addressable().then_some(function)
    }

    /// First function whose raw or demangled name is `name`.
    pub fn named(&self, name: &str) -> Option<&FunctionDescriptor>
    {
        self.functions
            .iter()
            .find(|function| function.name.matches(name))
    }

    pub fn functions(&self) -> &[FunctionDescriptor]
    {
        &self.functions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FunctionDescriptor>
    {
        self.functions.iter()
    }

    pub fn len(&self) -> usize
    {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::dwarf::DebugSections;

    #[rustfmt::skip]
    const ABBREV: &[u8] = &[
        1, 0x11, 1, 0, 0,
        // subprogram: name, low_pc addr, high_pc data4, decl_file data1
        2, 0x2e, 1, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0x3a, 0x0b, 0, 0,
        3, 0x05, 0, 0x03, 0x08, 0, 0,
        // declaration only
        4, 0x2e, 0, 0x03, 0x08, 0, 0,
        5, 0x0b, 1, 0, 0,
        0,
    ];

    fn table() -> FunctionTable
    {
        #[rustfmt::skip]
        let body = [
            1,
            2, b'b', 0, 0x20, 0, 0, 0, 0x10, 0, 0, 0, 1,
                3, b'x', 0,
                0,
            2, b'a', 0, 0x10, 0, 0, 0, 4, 0, 0, 0, 2,
                3, b'y', 0,
                3, b'z', 0,
                5,
                    3, b'q', 0,
                    0,
                0,
            4, b'd', 0,
            0,
        ];
        let mut info = ((body.len() + 7) as u32).to_le_bytes().to_vec();
        info.extend(4u16.to_le_bytes());
        info.extend(0u32.to_le_bytes());
        info.push(4);
        info.extend(body);

        let tree = EntryTree::parse(DebugSections {
            info: &info,
            abbrev: ABBREV,
            str: &[],
        })
        .unwrap();
        FunctionTable::build(&tree, &["./a.c".to_string(), "src/b.c".to_string()])
    }

    #[test]
    fn test_sorted_by_low_pc()
    {
        let table = table();
        let names: Vec<_> = table.iter().map(|function| function.name.raw()).collect();
        assert_eq!(names, ["d", "a", "b"]);

        let a = &table.functions()[1];
        assert_eq!(a.low_pc, Some(Address::new(0x10)));
        assert_eq!(a.high_pc, Some(Address::new(0x14)));
        assert_eq!(a.decl_file.as_deref(), Some("src/b.c"));
        assert_eq!(table.functions()[2].decl_file.as_deref(), Some("./a.c"));
    }

    #[test]
    fn test_parameters_stop_at_other_entries()
    {
        let table = table();
        let params: Vec<_> = table.functions()[1]
            .parameters
            .iter()
            .map(|parameter| parameter.name.as_str())
            .collect();
        assert_eq!(params, ["y", "z"]);
        assert_eq!(table.functions()[2].parameters.len(), 1);
        assert!(table.functions()[0].parameters.is_empty());
    }

    #[test]
    fn test_for_address()
    {
        let table = table();
        let name = |address: u64| table.for_address(Address::new(address)).map(|function| function.name.raw());

        assert_eq!(name(0x10), Some("a"));
        assert_eq!(name(0x15), Some("a"));
        assert_eq!(name(0x25), Some("b"));
        assert_eq!(name(0x1000), Some("b"));
        // Floor is the declaration without an address
        assert_eq!(name(0x5), None);
    }

    #[test]
    fn test_named()
    {
        let table = table();
        assert_eq!(table.named("a").and_then(|f| f.low_pc), Some(Address::new(0x10)));
        assert_eq!(table.named("d").map(|f| f.is_addressable()), Some(false));
        assert!(table.named("missing").is_none());
    }
}
