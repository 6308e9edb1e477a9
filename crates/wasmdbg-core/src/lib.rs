//! # wasmdbg-core
//!
//! DWARF debug info for WebAssembly modules, decoded and applied to a live
//! frame.
//!
//! This crate provides:
//! - Section splitting of module binaries and the function names they export
//! - Decoders for the DWARF line program, abbreviation tables and debug entry
//!   tree
//! - A function table and an address index for offset lookups
//! - An instruction index used to compute single-step boundaries
//! - A value resolver that formats parameters from locals and linear memory
//!
//! ## Layout
//!
//! Decoding happens once per module in
//! [`ModuleHandle::parse`](module::ModuleHandle::parse). The resulting handle
//! is immutable and answers queries about any frame the host reports. A
//! [`Session`](session::Session) keeps the loaded modules and notifies
//! interested parties when a new one arrives.
//!
//! Addresses in the debug info are relative to the start of the code section
//! contents; the host reports module byte offsets. [`types::Address`] is the
//! former, plain `u64` offsets are the latter.

pub mod code;
pub mod config;
pub mod dwarf;
pub mod error;
pub mod events;
pub mod functions;
pub mod host;
pub mod index;
pub mod module;
pub mod prelude;
pub mod reader;
pub mod session;
pub mod symbols;
pub mod types;
pub mod value;

pub use config::SessionConfig;
// Re-export commonly used types
pub use error::{Result, WasmDbgError};
pub use module::{ModuleHandle, ParseStatus, QueryError};
pub use session::{CallStack, Session};
pub use types::{Address, ModuleId};
