//! # Symbols
//!
//! Presentation of function names found in debug info and export sections.

pub mod demangle;

pub use demangle::make_symbol_name;
