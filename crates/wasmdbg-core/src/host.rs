//! # Host Bridge
//!
//! The live-process side of the debugger.
//!
//! The host owns the running module instance. At every stop it hands the
//! session a [`Frame`]: where execution is, the values of the current
//! function's locals and a snapshot of linear memory and globals. The snapshot
//! must stay unchanged while a query runs; the resolver only reads it.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::value::LocalValue;

/// Linear memory and globals captured at a stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalsSnapshot
{
    /// Contents of memory 0
    pub memory: Vec<u8>,
    /// Global name → integer value
    pub globals: BTreeMap<String, i64>,
}

/// State of the innermost wasm frame.
///
/// Hosts that only show a text rendering of the function report its name
/// instead of a byte offset; the function is then looked up by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame
{
    /// Module byte offset of the current instruction
    pub byte_offset: Option<u64>,
    /// Function name as the host reports it, e.g. `add (wasm-function[1])`
    pub function_name: Option<String>,
    /// Locals by position; parameters come first (`arg#0`, `arg#1`, ...)
    pub locals: Vec<LocalValue>,
    pub globals: GlobalsSnapshot,
}

impl Frame
{
    /// Frame stopped at a known module byte offset.
    pub fn new(byte_offset: u64, locals: Vec<LocalValue>, memory: Vec<u8>) -> Self
    {
        Self {
            byte_offset: Some(byte_offset),
            function_name: None,
            locals,
            globals: GlobalsSnapshot {
                memory,
                globals: BTreeMap::new(),
            },
        }
    }

    /// Frame known only by the name of its function.
    pub fn in_function(function_name: impl Into<String>, locals: Vec<LocalValue>, memory: Vec<u8>) -> Self
    {
        Self {
            byte_offset: None,
            function_name: Some(function_name.into()),
            ..Self::new(0, locals, memory)
        }
    }

    /// Function name with any trailing decoration (` (wasm-function[3])`,
    /// argument lists) cut off at the first `(`.
    pub fn guessed_function_name(&self) -> Option<&str>
    {
        let name = self.function_name.as_deref()?;
        let name = name.split('(').next().unwrap_or_default().trim();
        (!name.is_empty()).then_some(name)
    }

    /// Local `arg#index`.
    pub fn local(&self, index: usize) -> Option<LocalValue>
    {
        self.locals.get(index).copied()
    }
}

/// Live process collaborator.
///
/// ## Example
///
/// ```rust
/// use wasmdbg_core::error::Result;
/// use wasmdbg_core::host::{Frame, HostBridge};
///
/// struct Recorded(Frame);
///
/// impl HostBridge for Recorded
/// {
///     fn current_frame(&self) -> Result<Frame>
///     {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait HostBridge
{
    /// Snapshot of the frame the host is stopped in.
    ///
    /// ## Errors
    ///
    /// Returns an error if the host cannot read the process state.
    fn current_frame(&self) -> Result<Frame>;
}

/// A [`HostBridge`] that always returns the same frame.
///
/// Used by the command-line front end and tests, where the "process" is a
/// frame described up front.
#[derive(Debug, Clone, Default)]
pub struct StaticHost
{
    frame: Frame,
}

impl StaticHost
{
    pub fn new(frame: Frame) -> Self
    {
        Self { frame }
    }
}

impl HostBridge for StaticHost
{
    fn current_frame(&self) -> Result<Frame>
    {
        Ok(self.frame.clone())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_guessed_function_name()
    {
        let frame = Frame::in_function("add (wasm-function[1])", Vec::new(), Vec::new());
        assert_eq!(frame.byte_offset, None);
        assert_eq!(frame.guessed_function_name(), Some("add"));

        assert_eq!(Frame::in_function("main", Vec::new(), Vec::new()).guessed_function_name(), Some("main"));
        assert_eq!(Frame::in_function("(anonymous)", Vec::new(), Vec::new()).guessed_function_name(), None);
        assert_eq!(Frame::new(0x20, Vec::new(), Vec::new()).guessed_function_name(), None);
    }
}
