//! # DWARF
//!
//! Hand-written decoders for the subset of DWARF 2-4 that WebAssembly
//! toolchains emit: line-number programs, abbreviation tables and the debug
//! entry tree. `gimli` supplies the constant definitions (`DW_TAG_*`,
//! `DW_AT_*`, `DW_FORM_*`, ...) and their names; the decoding itself is done
//! here so partial or slightly malformed producers degrade per section rather
//! than failing as a whole.

pub mod abbrev;
pub mod info;
pub mod line;

pub use abbrev::{Abbreviation, AbbreviationTable, AttributeSpec};
pub use info::{AttributeValue, DebugEntry, DebugSections, EntryId, EntryTree, TypeRef, UnitHeader};
pub use line::{FileEntry, LineProgramHeader, LineRow, LineTable};
