//! # Modules
//!
//! Splitting a module binary into sections and the per-module state built on
//! top of them.

pub mod handle;
pub mod sections;

pub use handle::{
    ModuleHandle, ParseStatus, QueryError, ResolvedArguments, Severity, FUNCTION_NAME_NOT_FOUND, FUNCTION_NOT_FOUND,
    PARSE_ERROR_TITLE,
};
pub use sections::{read_module_file, ModuleSections, Section};
