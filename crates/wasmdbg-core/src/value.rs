//! # Value Resolver
//!
//! Formats raw bytes according to a DWARF type.
//!
//! A value is read either from a function local (passed by value, always
//! widened to 8 little-endian bytes) or from the module's linear memory.
//! Pointers are followed into linear memory, structs are expanded member by
//! member, and any other type that wraps a further type (typedefs,
//! qualifiers) is unwrapped transparently.
//!
//! Nothing in here fails: bad pointers, unsupported sizes and unresolved
//! types are rendered as inline diagnostic text so the rest of a frame can
//! still be shown.
//!
//! ## Output
//!
//! ```text
//! (int) 5
//! (char*) hello (0x1000)
//! &Point (0x2000) { x: (float) 1, y: (float) 2 }
//! ```

use std::fmt;

use gimli::constants::{self, DwAte};

use crate::config::SessionConfig;
use crate::dwarf::{DebugEntry, EntryTree, TypeRef};
use crate::reader::{ByteReader, Endian};

/// `DW_CC_pass_by_reference`
const DW_CC_PASS_BY_REFERENCE: u64 = 4;

/// Shown instead of values nested deeper than [`SessionConfig::max_value_depth`].
pub const MAX_DEPTH_MARKER: &str = "<max depth reached>";

/// Value of a WebAssembly local as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalValue
{
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl LocalValue
{
    /// Bit pattern widened to 8 little-endian bytes.
    ///
    /// 32-bit values are zero-extended so an unsigned 8-byte read of an `i32`
    /// local does not pick up sign bits.
    pub fn to_le_bytes(self) -> [u8; 8]
    {
        match self {
            LocalValue::I32(value) => u64::from(value as u32).to_le_bytes(),
            LocalValue::I64(value) => value.to_le_bytes(),
            LocalValue::F32(value) => u64::from(value.to_bits()).to_le_bytes(),
            LocalValue::F64(value) => value.to_le_bytes(),
        }
    }
}

impl fmt::Display for LocalValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            LocalValue::I32(value) => write!(f, "{value}"),
            LocalValue::I64(value) => write!(f, "{value}"),
            LocalValue::F32(value) => write!(f, "{value}"),
            LocalValue::F64(value) => write!(f, "{value}"),
        }
    }
}

/// Where the bytes of a value come from.
#[derive(Debug, Clone, Copy)]
pub enum ValueSource<'a>
{
    /// A local passed by value (see [`LocalValue::to_le_bytes`])
    Local(&'a [u8]),
    /// The module's linear memory
    Memory(&'a [u8]),
}

impl<'a> ValueSource<'a>
{
    pub fn bytes(&self) -> &'a [u8]
    {
        match self {
            ValueSource::Local(bytes) | ValueSource::Memory(bytes) => bytes,
        }
    }
}

/// A formatted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedValue
{
    /// Scalar such as `(int) 5`, or an inline diagnostic
    Text(String),
    /// Expanded struct
    Record
    {
        display_name: String,
        /// Member name and value, in declaration order
        fields: Vec<(String, FormattedValue)>,
    },
}

impl FormattedValue
{
    pub fn as_text(&self) -> Option<&str>
    {
        match self {
            FormattedValue::Text(text) => Some(text),
            FormattedValue::Record { .. } => None,
        }
    }

    /// Look up a struct field by name.
    pub fn field(&self, name: &str) -> Option<&FormattedValue>
    {
        match self {
            FormattedValue::Record { fields, .. } => fields.iter().find(|(field, _)| field == name).map(|(_, v)| v),
            FormattedValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FormattedValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            FormattedValue::Text(text) => write!(f, "{text}"),
            FormattedValue::Record { display_name, fields } => {
                write!(f, "{display_name} {{")?;
                for (index, (name, value)) in fields.iter().enumerate() {
                    let separator = if index == 0 { " " } else { ", " };
                    write!(f, "{separator}{name}: {value}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl From<String> for FormattedValue
{
    fn from(text: String) -> Self
    {
        FormattedValue::Text(text)
    }
}

/// Formats values of one module against one memory snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ValueResolver<'a>
{
    tree: &'a EntryTree,
    memory: &'a [u8],
    config: &'a SessionConfig,
}

impl<'a> ValueResolver<'a>
{
    pub fn new(tree: &'a EntryTree, memory: &'a [u8], config: &'a SessionConfig) -> Self
    {
        Self { tree, memory, config }
    }

    /// Format the local `value` whose type is `type_ref`.
    pub fn resolve_local(&self, type_ref: Option<TypeRef>, value: LocalValue) -> FormattedValue
    {
        let bytes = value.to_le_bytes();
        self.resolve(type_ref, ValueSource::Local(&bytes), 0, false)
    }

    /// Format the value of type `type_ref` stored at `offset` of `source`.
    ///
    /// `is_pointer_target` is set when the value was reached by following a
    /// pointer; it changes how base types are labelled and turns `signed
    /// char` into a C string read.
    pub fn resolve(&self, type_ref: Option<TypeRef>, source: ValueSource<'_>, offset: u64, is_pointer_target: bool) -> FormattedValue
    {
        self.resolve_at(type_ref, source, offset, is_pointer_target, 0)
    }

    fn resolve_at(
        &self,
        type_ref: Option<TypeRef>,
        source: ValueSource<'_>,
        offset: u64,
        is_pointer_target: bool,
        depth: usize,
    ) -> FormattedValue
    {
        if depth > self.config.max_value_depth {
            return FormattedValue::Text(MAX_DEPTH_MARKER.to_string());
        }
        let id = match type_ref {
            Some(TypeRef::Resolved(id)) => id,
            Some(TypeRef::Unresolved(address)) => {
                return FormattedValue::Text(format!("Unresolved address {address}"));
            }
            None => return FormattedValue::Text("(void)".to_string()),
        };
        let Some(ty) = self.tree.get(id) else {
            return FormattedValue::Text(format!("Unresolved entry {}", id.index()));
        };

        match ty.tag {
            constants::DW_TAG_base_type => FormattedValue::Text(self.base_type(ty, source, offset, is_pointer_target)),
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                if let ValueSource::Local(_) = source {
                    // Aggregates arrive in locals as their address
                    return self.dereference(Some(TypeRef::Resolved(id)), source, offset, depth);
                }
                self.record(ty, offset, depth)
            }
            constants::DW_TAG_pointer_type | constants::DW_TAG_reference_type | constants::DW_TAG_rvalue_reference_type => {
                self.dereference(ty.resolved_type, source, offset, depth)
            }
            _ => match ty.resolved_type {
                Some(inner) => self.resolve_at(Some(inner), source, offset, is_pointer_target, depth + 1),
                None => FormattedValue::Text(format!("unhandled tag {} (value {})", ty.tag, describe(source, offset))),
            },
        }
    }

    /// Read a 32-bit address at `offset` of `source` and format the pointee.
    fn dereference(&self, pointee: Option<TypeRef>, source: ValueSource<'_>, offset: u64, depth: usize) -> FormattedValue
    {
        let address = match read_scalar(source.bytes(), offset, self.config.pointer_size) {
            Ok(raw) => raw,
            Err(message) => return FormattedValue::Text(message),
        };
        if pointee.is_none() {
            return FormattedValue::Text(format!("(void*) 0x{address:x}"));
        }
        let memory_len = self.memory.len() as u64;
        if address >= memory_len {
            return FormattedValue::Text(format!(
                "Invalid pointer, accessing 0x{address:x}, max of 0x{memory_len:x}"
            ));
        }
        self.resolve_at(pointee, ValueSource::Memory(self.memory), address, true, depth + 1)
    }

    fn record(&self, ty: &DebugEntry, offset: u64, depth: usize) -> FormattedValue
    {
        let mut display_name = ty.name().unwrap_or("<anonymous>").to_string();
        if ty.attr_u64(constants::DW_AT_calling_convention) == Some(DW_CC_PASS_BY_REFERENCE) {
            display_name.insert(0, '&');
        }
        display_name.push_str(&format!(" (0x{offset:x})"));

        let memory_len = self.memory.len() as u64;
        let mut fields = Vec::new();
        for child in &ty.children {
            let Some(member) = self.tree.get(*child) else {
                continue;
            };
            if member.tag != constants::DW_TAG_member {
                continue;
            }
            let name = member.name().unwrap_or_default().to_string();
            let member_offset = offset.saturating_add(member.member_offset().unwrap_or(0));
            let value = if member_offset >= memory_len {
                FormattedValue::Text(format!(
                    "Invalid struct pointer, accessing 0x{member_offset:x}, max of 0x{memory_len:x}"
                ))
            } else {
                self.resolve_at(member.resolved_type, ValueSource::Memory(self.memory), member_offset, false, depth + 1)
            };
            fields.push((name, value));
        }

        FormattedValue::Record { display_name, fields }
    }

    fn base_type(&self, ty: &DebugEntry, source: ValueSource<'_>, offset: u64, is_pointer_target: bool) -> String
    {
        let name = ty.name().unwrap_or("?");
        let size = ty.byte_size().unwrap_or(0);
        let encoding = ty
            .attr_u64(constants::DW_AT_encoding)
            .and_then(|raw| u8::try_from(raw).ok())
            .map(DwAte);
        let bytes = source.bytes();

        let end = offset.saturating_add(size);
        if end > bytes.len() as u64 {
            return format!(
                "Invalid value, accessing ending at 0x{offset:x} to 0x{end:x}, buffer end of 0x{:x}",
                bytes.len()
            );
        }

        let value = match encoding {
            Some(constants::DW_ATE_signed_char) if is_pointer_target => self.c_string(bytes, offset),
            Some(constants::DW_ATE_float) => match size {
                4 => read_scalar(bytes, offset, 4).map(|bits| f32::from_bits(bits as u32).to_string()),
                8 => read_scalar(bytes, offset, 8).map(|bits| f64::from_bits(bits).to_string()),
                _ => return format!("Unsupported floating point byte size of {size}"),
            }
            .unwrap_or_else(|message| message),
            Some(constants::DW_ATE_boolean) => match read_scalar(bytes, offset, size as usize) {
                Ok(raw) => (raw != 0).to_string(),
                Err(message) => return message,
            },
            Some(constants::DW_ATE_signed | constants::DW_ATE_signed_char) => {
                if !matches!(size, 1 | 2 | 4 | 8) {
                    return format!("Unsupported integer byte size of {size}");
                }
                let mut reader = ByteReader::new(bytes);
                match reader.seek(offset as usize).and_then(|()| reader.read_int(size as usize, Endian::Little)) {
                    Ok(value) => value.to_string(),
                    Err(err) => return err.to_string(),
                }
            }
            _ => {
                if !matches!(size, 1 | 2 | 4 | 8) {
                    return format!("Unsupported integer byte size of {size}");
                }
                match read_scalar(bytes, offset, size as usize) {
                    Ok(value) => value.to_string(),
                    Err(message) => return message,
                }
            }
        };

        if is_pointer_target {
            format!("({name}*) {value} (0x{offset:x})")
        } else {
            format!("({name}) {value}")
        }
    }

    /// Decode a zero-terminated string of at most `max_c_string_len` bytes.
    fn c_string(&self, bytes: &[u8], offset: u64) -> String
    {
        let start = offset as usize;
        let limit = self.config.max_c_string_len.min(bytes.len().saturating_sub(start));
        let window = &bytes[start..start + limit];
        match window.iter().position(|byte| *byte == 0) {
            Some(len) => String::from_utf8_lossy(&window[..len]).into_owned(),
            None => format!("{} (NO NULL)", String::from_utf8_lossy(window)),
        }
    }
}

/// Unsigned little-endian read of `size` bytes, with the diagnostic text on failure.
fn read_scalar(bytes: &[u8], offset: u64, size: usize) -> Result<u64, String>
{
    let end = offset.saturating_add(size as u64);
    if end > bytes.len() as u64 {
        return Err(format!(
            "Invalid value, accessing ending at 0x{offset:x} to 0x{end:x}, buffer end of 0x{:x}",
            bytes.len()
        ));
    }
    let mut reader = ByteReader::new(bytes);
    reader
        .seek(offset as usize)
        .and_then(|()| reader.read_uint(size, Endian::Little))
        .map_err(|err| err.to_string())
}

fn describe(source: ValueSource<'_>, offset: u64) -> String
{
    match source {
        ValueSource::Local(bytes) => read_scalar(bytes, 0, 8).map_or_else(|message| message, |raw| raw.to_string()),
        ValueSource::Memory(_) => format!("0x{offset:x}"),
    }
}
