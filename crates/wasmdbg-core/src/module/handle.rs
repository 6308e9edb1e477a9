//! # Module Handle
//!
//! Everything derived from one module binary, and the queries answered from
//! it.
//!
//! [`ModuleHandle::parse`] is the only entry point that decodes a module. It
//! never fails: every problem is folded into the handle's [`ParseStatus`], so
//! one malformed module cannot take down the session or the host. Whatever
//! could be decoded stays available (for example the instruction index of a
//! module without debug info).

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gimli::constants;
use thiserror::Error;
use tracing::{debug, warn};

use super::sections::{ModuleSections, CODE_SECTION};
use crate::code::InstructionIndex;
use crate::config::SessionConfig;
use crate::dwarf::{DebugSections, EntryTree, LineRow, LineTable};
use crate::error::Result;
use crate::functions::{FunctionDescriptor, FunctionTable};
use crate::host::Frame;
use crate::index::AddressIndex;
use crate::types::{Address, ModuleId};
use crate::value::{FormattedValue, ValueResolver};

/// Title used for structural decoding failures.
pub const PARSE_ERROR_TITLE: &str = "Parse Error";

/// Title of a query whose frame matches no function.
pub const FUNCTION_NOT_FOUND: &str = "Function not found";

/// Title of a query whose frame carries no usable location.
pub const FUNCTION_NAME_NOT_FOUND: &str = "Function name not found";

/// Outcome of parsing a module's debug info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus
{
    /// Everything decoded
    Ok,
    /// Decoded with a limitation worth telling the user about
    Warning(String),
    /// Required debug sections are absent
    MissingSections(Vec<String>),
    /// A section could not be decoded
    Error
    {
        title: String,
        message: String,
    },
}

impl ParseStatus
{
    /// `true` unless debug info is missing or broken.
    pub fn is_usable(&self) -> bool
    {
        matches!(self, ParseStatus::Ok | ParseStatus::Warning(_))
    }

    /// Short heading for the status.
    pub fn title(&self) -> &str
    {
        match self {
            ParseStatus::Ok => "OK",
            ParseStatus::Warning(_) => "Warning",
            ParseStatus::MissingSections(missing) => {
                if missing.iter().any(|name| name == ".debug_line") {
                    "No DWARF debug info in WASM"
                } else {
                    "Incomplete DWARF debug info in WASM"
                }
            }
            ParseStatus::Error { title, .. } => title,
        }
    }

    /// Details for the status.
    pub fn message(&self) -> String
    {
        match self {
            ParseStatus::Ok => String::new(),
            ParseStatus::Warning(message) | ParseStatus::Error { message, .. } => message.clone(),
            ParseStatus::MissingSections(missing) => format!("Missing sections: {}", missing.join(", ")),
        }
    }
}

impl fmt::Display for ParseStatus
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ParseStatus::Ok => write!(f, "OK"),
            other => write!(f, "{}: {}", other.title(), other.message()),
        }
    }
}

/// How serious a [`QueryError`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity
{
    Warning,
    Error,
}

impl fmt::Display for Severity
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Severity::Warning => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Why a live query could not be answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{title}: {message}")]
pub struct QueryError
{
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl QueryError
{
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self
    {
        Self {
            severity: Severity::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self
    {
        Self {
            severity: Severity::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Arguments of the function a frame is stopped in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArguments
{
    /// Display name of the function
    pub function: String,
    /// Parameter name → value, in declaration order; names are unique
    pub values: Vec<(String, FormattedValue)>,
    /// The module's parse summary
    pub message: String,
    pub status: ParseStatus,
}

impl ResolvedArguments
{
    pub fn get(&self, name: &str) -> Option<&FormattedValue>
    {
        self.values.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }
}

/// Parsed state of one module.
#[derive(Debug)]
pub struct ModuleHandle
{
    id: ModuleId,
    binary: Arc<[u8]>,
    live_exports: BTreeMap<u32, String>,
    config: SessionConfig,
    status: ParseStatus,
    parsed_message: String,
    parse_time: Duration,
    code_offset: u64,
    line_table: LineTable,
    address_index: AddressIndex,
    tree: EntryTree,
    functions: FunctionTable,
    instructions: InstructionIndex,
}

impl ModuleHandle
{
    /// Decode `binary`.
    ///
    /// `live_exports` (function index → name, as reported by the running
    /// instance) take precedence over the names in the export section.
    pub fn parse(id: ModuleId, binary: impl Into<Arc<[u8]>>, live_exports: BTreeMap<u32, String>, config: SessionConfig) -> Self
    {
        let binary = binary.into();
        let start = Instant::now();
        let mut handle = Self {
            id,
            binary: Arc::clone(&binary),
            live_exports,
            config,
            status: ParseStatus::Ok,
            parsed_message: String::new(),
            parse_time: Duration::ZERO,
            code_offset: 0,
            line_table: LineTable::default(),
            address_index: AddressIndex::default(),
            tree: EntryTree::default(),
            functions: FunctionTable::default(),
            instructions: InstructionIndex::default(),
        };

        match ModuleSections::parse(&binary) {
            Ok(sections) => handle.decode(&sections),
            Err(err) => handle.fail(&err),
        }

        handle.parse_time = start.elapsed();
        handle.parsed_message = handle.summary();
        debug!("{} parsed: {} ({})", handle.id, handle.status, handle.parsed_message);
        handle
    }

    /// Parse the retained binary again into a fresh handle.
    ///
    /// The stored handle is left untouched; this exists for diagnostics
    /// (timing, comparing results after a configuration change).
    #[must_use]
    pub fn reparse(&self) -> ModuleHandle
    {
        Self::parse(self.id, Arc::clone(&self.binary), self.live_exports.clone(), self.config)
    }

    fn fail(&mut self, err: &dyn std::error::Error)
    {
        warn!("{}: {err}", self.id);
        self.status = ParseStatus::Error {
            title: PARSE_ERROR_TITLE.to_string(),
            message: err.to_string(),
        };
    }

    fn decode(&mut self, sections: &ModuleSections<'_>)
    {
        self.code_offset = sections.code_offset().unwrap_or(0) as u64;
        self.index_code(sections);

        let missing = sections.missing_debug_sections();
        if let Some(line) = sections.custom(".debug_line") {
            match LineTable::parse(line) {
                Ok(table) => {
                    self.address_index = AddressIndex::build(table.rows());
                    self.line_table = table;
                }
                Err(err) => return self.fail(&err),
            }
        }
        if !missing.is_empty() {
            debug!("{}: missing {}", self.id, missing.join(", "));
            self.status = ParseStatus::MissingSections(missing.iter().map(ToString::to_string).collect());
            return;
        }

        let debug_sections = DebugSections {
            info: sections.custom(".debug_info").unwrap_or_default(),
            abbrev: sections.custom(".debug_abbrev").unwrap_or_default(),
            str: sections.custom(".debug_str").unwrap_or_default(),
        };
        match EntryTree::parse(debug_sections) {
            Ok(tree) => self.tree = tree,
            Err(err) => return self.fail(&err),
        }
        self.functions = FunctionTable::build(&self.tree, &self.line_table.file_paths());

        let programs = self.line_table.program_count();
        if programs > 1 {
            warn!("{}: .debug_line holds {programs} line programs, only the first is used", self.id);
            self.status = ParseStatus::Warning(format!("(Found {programs} dwarf sections, only the first was used)"));
        }
    }

    fn index_code(&mut self, sections: &ModuleSections<'_>)
    {
        let Some(code) = sections.section(CODE_SECTION) else {
            warn!("{}: no code section, stepping is unavailable", self.id);
            return;
        };

        let imported = sections.imported_function_count().unwrap_or_else(|err| {
            warn!("{}: could not read imports: {err}", self.id);
            0
        });
        let mut names = sections.exports().unwrap_or_else(|err| {
            warn!("{}: could not read exports: {err}", self.id);
            BTreeMap::new()
        });
        names.extend(self.live_exports.iter().map(|(index, name)| (*index, name.clone())));

        match InstructionIndex::parse(code.bytes) {
            Ok(index) => self.instructions = index.with_names(imported, names),
            Err(err) => warn!("{}: code section could not be indexed: {err}", self.id),
        }
    }

    fn summary(&self) -> String
    {
        let root = self.tree.roots().next().and_then(|id| self.tree.get(id));
        let producer = root
            .and_then(|entry| entry.attr_str(constants::DW_AT_producer))
            .unwrap_or("unknown");
        let name = root.and_then(|entry| entry.name()).unwrap_or("unknown");
        format!(
            "(parse time {}ms) COMPILER {producer}  --- NAME {name}",
            self.parse_time.as_millis()
        )
    }

    pub fn id(&self) -> ModuleId
    {
        self.id
    }

    /// The module binary the handle was parsed from.
    pub fn binary(&self) -> &[u8]
    {
        &self.binary
    }

    /// Split the retained binary into sections again.
    pub fn sections(&self) -> Result<ModuleSections<'_>>
    {
        ModuleSections::parse(&self.binary)
    }

    pub fn status(&self) -> &ParseStatus
    {
        &self.status
    }

    /// Compiler and unit name of the first compilation unit, plus parse time.
    pub fn parsed_message(&self) -> &str
    {
        &self.parsed_message
    }

    pub fn parse_time(&self) -> Duration
    {
        self.parse_time
    }

    /// Module offset of the code section contents.
    pub fn code_offset(&self) -> u64
    {
        self.code_offset
    }

    pub fn config(&self) -> &SessionConfig
    {
        &self.config
    }

    pub fn functions(&self) -> &FunctionTable
    {
        &self.functions
    }

    pub fn entries(&self) -> &EntryTree
    {
        &self.tree
    }

    pub fn line_table(&self) -> &LineTable
    {
        &self.line_table
    }

    /// Rows of the executed line program.
    pub fn line_rows(&self) -> &[LineRow]
    {
        self.line_table.rows()
    }

    pub fn address_index(&self) -> &AddressIndex
    {
        &self.address_index
    }

    pub fn instructions(&self) -> &InstructionIndex
    {
        &self.instructions
    }

    /// First line row at the greatest address `<=` `address`.
    pub fn line_for_address(&self, address: Address) -> Option<&LineRow>
    {
        let entry = self.address_index.floor(address)?;
        entry.rows.first().and_then(|index| self.line_table.rows().get(*index))
    }

    /// Function containing the module byte offset `module_offset`.
    pub fn function_for_offset(&self, module_offset: u64) -> Option<&FunctionDescriptor>
    {
        let address = Address::from_module_offset(module_offset, self.code_offset)?;
        self.functions.for_address(address)
    }

    /// Where a single step starting at `module_offset` has to stop.
    ///
    /// See [`InstructionIndex::next_step_boundary`].
    pub fn next_step_boundary(&self, module_offset: u64) -> Option<u64>
    {
        self.instructions.next_step_boundary(
            module_offset,
            self.code_offset,
            &self.address_index,
            self.line_table.rows(),
        )
    }

    /// Function `frame` is stopped in, by byte offset when the host knows it
    /// and by name otherwise.
    fn frame_function(&self, frame: &Frame) -> std::result::Result<&FunctionDescriptor, QueryError>
    {
        if let Some(byte_offset) = frame.byte_offset {
            let code_offset = byte_offset.wrapping_sub(self.code_offset) as i64;
            return self.function_for_offset(byte_offset).ok_or_else(|| {
                QueryError::warning(FUNCTION_NOT_FOUND, format!("Looked for wasm byte offset {code_offset}"))
            });
        }

        let Some(name) = frame.guessed_function_name() else {
            return Err(QueryError::warning(
                FUNCTION_NAME_NOT_FOUND,
                format!(
                    "The frame has no byte offset and no usable function name ({:?})",
                    frame.function_name.as_deref().unwrap_or_default()
                ),
            ));
        };
        self.functions.named(name).ok_or_else(|| {
            let known: Vec<_> = self.functions.iter().map(|function| function.name.raw()).collect();
            QueryError::warning(
                FUNCTION_NOT_FOUND,
                format!("No function named {name}. Found functions {}", known.join(", ")),
            )
        })
    }

    /// Format the parameters of the function `frame` is stopped in.
    ///
    /// Parameter `i` is read from local `i`. Parameters sharing a name get a
    /// numeric suffix (`x`, `x1`, `x2`, ...).
    ///
    /// ## Errors
    ///
    /// Returns a [`QueryError`] when the module has no usable debug info or
    /// no function matches the frame's offset or name.
    pub fn resolve_arguments(&self, frame: &Frame) -> std::result::Result<ResolvedArguments, QueryError>
    {
        match &self.status {
            ParseStatus::Error { title, message } => return Err(QueryError::error(title.clone(), message.clone())),
            status @ ParseStatus::MissingSections(_) => return Err(QueryError::warning(status.title(), status.message())),
            ParseStatus::Ok | ParseStatus::Warning(_) => {}
        }
        if self.functions.is_empty() {
            return Err(QueryError::warning(
                FUNCTION_NOT_FOUND,
                format!("No functions were found in the debug info of {}", self.id),
            ));
        }

        let function = self.frame_function(frame)?;

        let resolver = ValueResolver::new(&self.tree, &frame.globals.memory, &self.config);
        let mut seen = HashSet::new();
        let mut values = Vec::with_capacity(function.parameters.len());
        for (index, parameter) in function.parameters.iter().enumerate() {
            let mut name = if parameter.name.is_empty() { format!("arg#{index}") } else { parameter.name.clone() };
            if seen.contains(&name) {
                let mut suffix = 1;
                while seen.contains(&format!("{name}{suffix}")) {
                    suffix += 1;
                }
                name = format!("{name}{suffix}");
            }
            seen.insert(name.clone());

            let value = match frame.local(index) {
                Some(local) => resolver.resolve_local(parameter.type_ref, local),
                None => FormattedValue::Text(format!("<no value for local arg#{index}>")),
            };
            values.push((name, value));
        }

        Ok(ResolvedArguments {
            function: function.name.display_name().to_string(),
            values,
            message: self.parsed_message.clone(),
            status: self.status.clone(),
        })
    }
}
