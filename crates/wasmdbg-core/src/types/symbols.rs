//! Symbol and source location types.

use std::fmt;

/// Source language guessed from how a function name is mangled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// `_R`/`_ZN` manglings or `::` paths
    Rust,
    /// Other Itanium (`_Z`) manglings
    Cpp,
    C,
    /// Names no compiler would emit, e.g. `$func12` from a name section
    Unknown,
}

impl SymbolLanguage
{
    pub fn as_str(self) -> &'static str
    {
        match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::C => "c",
            SymbolLanguage::Unknown => "?",
        }
    }

    /// Whether names in this language are stored mangled.
    pub fn is_mangled(self) -> bool
    {
        matches!(self, SymbolLanguage::Rust | SymbolLanguage::Cpp)
    }
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.pad(self.as_str())
    }
}

/// Function name from the debug info, with its readable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// `DW_AT_name` (or the linkage name) as stored.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// The demangled form when there is one.
    pub fn display_name(&self) -> &str
    {
        self.demangled().unwrap_or(&self.raw)
    }

    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }

    /// Whether a host-reported function name refers to this symbol.
    ///
    /// Hosts show either form, so both are compared.
    pub fn matches(&self, name: &str) -> bool
    {
        self.raw == name || self.demangled() == Some(name)
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.display_name())
    }
}

/// Source location of a code address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation
{
    /// Full path as resolved from the line program's file table.
    pub file: String,
    /// Line number (1-based, 0 when the producer gave none).
    pub line: u64,
    /// Column number (0 when unknown).
    pub column: u64,
}

impl SourceLocation
{
    /// `file:line` key used to detect line changes while stepping.
    pub fn line_key(&self) -> String
    {
        format!("{}:{}", self.file, self.line)
    }
}

impl fmt::Display for SourceLocation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.column > 0 {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}
