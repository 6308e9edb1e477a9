//! Symbol demangling utilities.
//!
//! WebAssembly modules built from Rust or C++ carry mangled linkage names in
//! their debug info and export sections. This module turns them back into
//! readable names and guesses the source language from the mangling pattern:
//!
//! - Rust symbols: Start with `_R` or `_ZN`, or contain `::`
//! - C++ symbols: Start with `_Z` (Itanium mangling)
//! - C symbols: Plain identifiers

use rustc_demangle::try_demangle;

use crate::types::{SymbolLanguage, SymbolName};

/// Create a `SymbolName` from a raw, possibly mangled, name.
///
/// `rustc_demangle` only understands Rust manglings; for those the alternate
/// formatting is used so the trailing hash is dropped.
///
/// ## Example
///
/// ```rust
/// use wasmdbg_core::symbols::make_symbol_name;
/// use wasmdbg_core::types::SymbolLanguage;
///
/// let name = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE".to_string());
/// assert_eq!(name.display_name(), "core::fmt::write");
/// assert_eq!(name.language(), SymbolLanguage::Rust);
///
/// let plain = make_symbol_name("add".to_string());
/// assert_eq!(plain.display_name(), "add");
/// assert_eq!(plain.language(), SymbolLanguage::C);
/// ```
pub fn make_symbol_name(raw: String) -> SymbolName
{
    let demangled = try_demangle(&raw).ok().map(|d| format!("{d:#}"));
    let language = if raw.starts_with("_R") || raw.starts_with("_ZN") || raw.contains("::") {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else if is_c_identifier(&raw) {
        SymbolLanguage::C
    } else {
        SymbolLanguage::Unknown
    };

    SymbolName::new(raw, demangled, language)
}

fn is_c_identifier(name: &str) -> bool
{
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_unknown_language_for_odd_names()
    {
        let name = make_symbol_name("$func12".to_string());
        assert_eq!(name.language(), SymbolLanguage::Unknown);
        assert_eq!(name.display_name(), "$func12");
        assert!(name.demangled().is_none());
    }

    #[test]
    fn test_cpp_detection()
    {
        let name = make_symbol_name("_Z3addii".to_string());
        assert_eq!(name.language(), SymbolLanguage::Cpp);
        assert!(name.language().is_mangled());
        assert_eq!(name.raw(), "_Z3addii");
    }

    #[test]
    fn test_matches_either_form()
    {
        let name = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE".to_string());
        assert!(name.matches("core::fmt::write"));
        assert!(name.matches("_ZN4core3fmt5write17h0123456789abcdefE"));
        assert!(!name.matches("write"));
        assert_eq!(name.language().to_string(), "rust");
        assert!(!make_symbol_name("add".to_string()).language().is_mangled());
    }
}
