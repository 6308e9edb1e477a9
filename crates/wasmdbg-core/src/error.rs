//! # Error Types
//!
//! General error handling for module parsing.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Errors in this enum are *structural*: they abort the decoding of the
//! section (or debug-info unit) being read. They never escape
//! [`ModuleHandle::parse`](crate::module::ModuleHandle::parse), which folds
//! them into a [`ParseStatus`](crate::module::ParseStatus). Query-time
//! problems (bad pointers, unknown functions) are reported inline instead, see
//! [`QueryError`](crate::module::QueryError).

use thiserror::Error;

/// Main error type for decoding operations
///
/// ## Error Categories
///
/// 1. **Cursor errors**: OutOfBounds, Leb128Overflow
/// 2. **Line program errors**: UnsupportedInstructionLength, InvalidLineRange
/// 3. **Debug info errors**: DuplicateAbbreviation, UnknownAbbreviation,
///    UnsupportedForm, UnsupportedUnitVersion
/// 4. **Module errors**: MalformedModule
/// 5. **Caller errors**: InvalidArgument
/// 6. **I/O errors**: Io (for reading modules from disk)
#[derive(Error, Debug)]
pub enum WasmDbgError
{
    /// A read would run past the end of the buffer
    ///
    /// Raised by every [`ByteReader`](crate::reader::ByteReader) operation.
    /// The parse of the current section stops; other sections are unaffected.
    #[error("Read of {needed} byte(s) at offset 0x{offset:x} exceeds buffer of {available} byte(s)")]
    OutOfBounds
    {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Number of bytes the read required
        needed: usize,
        /// Total size of the buffer
        available: usize,
    },

    /// A LEB128 value used more than ten bytes
    #[error("LEB128 value at offset 0x{0:x} does not fit in 64 bits")]
    Leb128Overflow(usize),

    /// The line program header declares a `minimum_instruction_length` other than 1
    ///
    /// WebAssembly producers always emit 1; anything else indicates a corrupt
    /// or foreign `.debug_line` section.
    #[error("minimum_instruction_length of {0} is not supported (only 1)")]
    UnsupportedInstructionLength(u8),

    /// The line program header declares a `line_range` of zero
    #[error("line_range of 0 in line program header")]
    InvalidLineRange,

    /// Two abbreviations in `.debug_abbrev` share the same code
    #[error("Duplicate abbreviation code {0}")]
    DuplicateAbbreviation(u64),

    /// An entry in `.debug_info` uses a code missing from the abbreviation table
    #[error("Unknown abbreviation code {code} at .debug_info offset 0x{offset:x}")]
    UnknownAbbreviation
    {
        /// Abbreviation code read from `.debug_info`
        code: u64,
        /// Section offset of the entry
        offset: u64,
    },

    /// An abbreviation uses a form this decoder does not implement
    #[error("Unsupported form type 0x{0:x}")]
    UnsupportedForm(u64),

    /// A compilation unit or line program header declares a version outside 2..=4
    #[error("Unsupported DWARF version {0}")]
    UnsupportedUnitVersion(u16),

    /// The module binary itself is malformed (bad preamble, truncated section, ...)
    #[error("Malformed module: {0}")]
    MalformedModule(String),

    /// Invalid argument passed to a library function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The module file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, WasmDbgError>`
///
/// ```rust
/// use wasmdbg_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, WasmDbgError>;
