//! # Types
//!
//! Small value types shared by the decoders and the query API.
//!
//! Addresses in this crate are always relative to the start of the code
//! section contents, which is how the line program and the debug info of a
//! WebAssembly module express them. Frame positions reported by a host are
//! *module* byte offsets; [`Address::from_module_offset`] converts between the
//! two.

pub mod address;
pub mod module;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use module::ModuleId;
pub use symbols::{SourceLocation, SymbolLanguage, SymbolName};
