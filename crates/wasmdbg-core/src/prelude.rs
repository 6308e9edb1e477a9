//! Common module for library exports

pub use crate::config::SessionConfig;
pub use crate::error::{Result, WasmDbgError};
pub use crate::events::{event_channel, SessionEvent};
pub use crate::functions::{FunctionDescriptor, FunctionTable, Parameter};
pub use crate::host::{Frame, GlobalsSnapshot, HostBridge, StaticHost};
pub use crate::module::{ModuleHandle, ParseStatus, QueryError, ResolvedArguments, Severity};
pub use crate::session::{CallStack, Session};
pub use crate::types::{Address, ModuleId, SourceLocation, SymbolName};
pub use crate::value::{FormattedValue, LocalValue};
