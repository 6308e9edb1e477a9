//! # Code/Instruction Indexer
//!
//! Decodes the code section into a flat, offset-ordered list of instructions.
//!
//! This is not a disassembler: operands are decoded only far enough to know
//! each instruction's length and to render a short text. The index exists to
//! answer one question for the stepper: *where does control next leave the
//! straight-line code of the current source line?*
//!
//! ## Opcode table
//!
//! Opcodes are looked up in a table built once on first use. An opcode
//! missing from the table ends decoding of its function body (the rest of the
//! body is skipped with a warning) while the following bodies are still
//! decoded.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use tracing::{debug, trace, warn};

use crate::dwarf::LineRow;
use crate::error::{Result, WasmDbgError};
use crate::index::{AddressIndex, search_by_key};
use crate::reader::ByteReader;
use crate::types::Address;

/// Operand encoding of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operands
{
    None,
    /// Fixed number of raw bytes
    Bytes(usize),
    /// Fixed number of unsigned LEB128 values
    Leb(usize),
    /// One signed LEB128 value (`i32.const`, `i64.const`)
    SignedLeb,
    /// Block type: empty, a value type, or a type index
    BlockType,
    /// Alignment and offset of a memory access
    MemArg,
    /// Label vector plus default label
    BranchTable,
    /// `0xfc` prefix: a LEB128 sub-opcode with its own operands
    Misc,
}

#[derive(Debug, Clone, Copy)]
struct OpcodeInfo
{
    mnemonic: &'static str,
    operands: Operands,
}

const LOADS: [&str; 14] = [
    "i32.load",
    "i64.load",
    "f32.load",
    "f64.load",
    "i32.load8_s",
    "i32.load8_u",
    "i32.load16_s",
    "i32.load16_u",
    "i64.load8_s",
    "i64.load8_u",
    "i64.load16_s",
    "i64.load16_u",
    "i64.load32_s",
    "i64.load32_u",
];

const STORES: [&str; 9] = [
    "i32.store",
    "i64.store",
    "f32.store",
    "f64.store",
    "i32.store8",
    "i32.store16",
    "i64.store8",
    "i64.store16",
    "i64.store32",
];

/// Operand-free numeric opcodes `0x45..=0xc4`.
const NUMERIC: [&str; 128] = [
    "i32.eqz", "i32.eq", "i32.ne", "i32.lt_s", "i32.lt_u", "i32.gt_s", "i32.gt_u", "i32.le_s", "i32.le_u", "i32.ge_s",
    "i32.ge_u", "i64.eqz", "i64.eq", "i64.ne", "i64.lt_s", "i64.lt_u", "i64.gt_s", "i64.gt_u", "i64.le_s", "i64.le_u",
    "i64.ge_s", "i64.ge_u", "f32.eq", "f32.ne", "f32.lt", "f32.gt", "f32.le", "f32.ge", "f64.eq", "f64.ne", "f64.lt",
    "f64.gt", "f64.le", "f64.ge", "i32.clz", "i32.ctz", "i32.popcnt", "i32.add", "i32.sub", "i32.mul", "i32.div_s",
    "i32.div_u", "i32.rem_s", "i32.rem_u", "i32.and", "i32.or", "i32.xor", "i32.shl", "i32.shr_s", "i32.shr_u",
    "i32.rotl", "i32.rotr", "i64.clz", "i64.ctz", "i64.popcnt", "i64.add", "i64.sub", "i64.mul", "i64.div_s",
    "i64.div_u", "i64.rem_s", "i64.rem_u", "i64.and", "i64.or", "i64.xor", "i64.shl", "i64.shr_s", "i64.shr_u",
    "i64.rotl", "i64.rotr", "f32.abs", "f32.neg", "f32.ceil", "f32.floor", "f32.trunc", "f32.nearest", "f32.sqrt",
    "f32.add", "f32.sub", "f32.mul", "f32.div", "f32.min", "f32.max", "f32.copysign", "f64.abs", "f64.neg", "f64.ceil",
    "f64.floor", "f64.trunc", "f64.nearest", "f64.sqrt", "f64.add", "f64.sub", "f64.mul", "f64.div", "f64.min",
    "f64.max", "f64.copysign", "i32.wrap_i64", "i32.trunc_f32_s", "i32.trunc_f32_u", "i32.trunc_f64_s",
    "i32.trunc_f64_u", "i64.extend_i32_s", "i64.extend_i32_u", "i64.trunc_f32_s", "i64.trunc_f32_u",
    "i64.trunc_f64_s", "i64.trunc_f64_u", "f32.convert_i32_s", "f32.convert_i32_u", "f32.convert_i64_s",
    "f32.convert_i64_u", "f32.demote_f64", "f64.convert_i32_s", "f64.convert_i32_u", "f64.convert_i64_s",
    "f64.convert_i64_u", "f64.promote_f32", "i32.reinterpret_f32", "i64.reinterpret_f64", "f32.reinterpret_i32",
    "f64.reinterpret_i64", "i32.extend8_s", "i32.extend16_s", "i64.extend8_s", "i64.extend16_s", "i64.extend32_s",
];

static OPCODES: Lazy<[Option<OpcodeInfo>; 256]> = Lazy::new(|| {
    let mut table = [None; 256];
    let mut set = |opcode: u8, mnemonic: &'static str, operands: Operands| {
        table[usize::from(opcode)] = Some(OpcodeInfo { mnemonic, operands });
    };

    set(0x00, "unreachable", Operands::None);
    set(0x01, "nop", Operands::None);
    set(0x02, "block", Operands::BlockType);
    set(0x03, "loop", Operands::BlockType);
    set(0x04, "if", Operands::BlockType);
    set(0x05, "else", Operands::None);
    set(0x0b, "end", Operands::None);
    set(0x0c, "br", Operands::Leb(1));
    set(0x0d, "br_if", Operands::Leb(1));
    set(0x0e, "br_table", Operands::BranchTable);
    set(0x0f, "return", Operands::None);
    set(0x10, "call", Operands::Leb(1));
    set(0x11, "call_indirect", Operands::Leb(2));
    set(0x1a, "drop", Operands::None);
    set(0x1b, "select", Operands::None);
    set(0x20, "local.get", Operands::Leb(1));
    set(0x21, "local.set", Operands::Leb(1));
    set(0x22, "local.tee", Operands::Leb(1));
    set(0x23, "global.get", Operands::Leb(1));
    set(0x24, "global.set", Operands::Leb(1));
    set(0x25, "table.get", Operands::Leb(1));
    set(0x26, "table.set", Operands::Leb(1));
    for (opcode, mnemonic) in (0x28u8..).zip(LOADS.into_iter().chain(STORES)) {
        set(opcode, mnemonic, Operands::MemArg);
    }
    set(0x3f, "memory.size", Operands::Bytes(1));
    set(0x40, "memory.grow", Operands::Bytes(1));
    set(0x41, "i32.const", Operands::SignedLeb);
    set(0x42, "i64.const", Operands::SignedLeb);
    set(0x43, "f32.const", Operands::Bytes(4));
    set(0x44, "f64.const", Operands::Bytes(8));
    for (opcode, mnemonic) in (0x45u8..).zip(NUMERIC) {
        set(opcode, mnemonic, Operands::None);
    }
    set(0xfc, "misc", Operands::Misc);
    table
});

/// Whether `opcode` can never transfer control.
///
/// Local/global access, loads and stores, constants, comparisons, arithmetic,
/// conversions and sign extension. Everything else (branches, calls, block
/// markers, `memory.grow`, prefixed opcodes) is treated as a possible branch.
pub fn cannot_branch(opcode: u8) -> bool
{
    matches!(opcode, 0x20..=0x24 | 0x28..=0x3e | 0x41..=0xc4)
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction
{
    /// Offset within the code section contents
    pub offset: Address,
    /// Mnemonic followed by rendered operands
    pub text: String,
    /// 1-based position of the owning body in the code section
    pub function_index: u32,
    /// Encoded length in bytes
    pub length: usize,
    pub may_branch: bool,
}

/// Location of one function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody
{
    /// 1-based position in the code section
    pub index: u32,
    /// Offset of the body's local declarations
    pub offset: Address,
    pub size: usize,
    /// Number of decoded instructions
    pub instruction_count: usize,
    /// Decoding stopped early at an unknown opcode
    pub truncated: bool,
}

/// All decoded instructions of a module.
#[derive(Debug, Clone, Default)]
pub struct InstructionIndex
{
    instructions: Vec<Instruction>,
    bodies: Vec<FunctionBody>,
    imported_functions: u32,
    export_names: BTreeMap<u32, String>,
}

impl InstructionIndex
{
    /// Decode the contents of the code section.
    ///
    /// Fails only when the body framing itself is broken (a body running past
    /// the end of the section); bad instructions inside a body only truncate
    /// that body.
    pub fn parse(code: &[u8]) -> Result<Self>
    {
        let mut reader = ByteReader::new(code);
        let count = reader.read_uleb128()?;
        trace!("Code section declares {count} bodies");

        let mut index = Self::default();
        let mut body_number = 0u32;
        while !reader.is_empty() {
            body_number += 1;
            let size = reader.read_uleb128()? as usize;
            let body_start = reader.position();
            let body_end = body_start.checked_add(size).filter(|end| *end <= code.len()).ok_or(
                WasmDbgError::OutOfBounds {
                    offset: body_start,
                    needed: size,
                    available: code.len(),
                },
            )?;

            let mut body = ByteReader::new(&code[..body_end]);
            body.seek(body_start)?;
            let first = index.instructions.len();
            let truncated = index.decode_body(&mut body, body_number);
            index.bodies.push(FunctionBody {
                index: body_number,
                offset: Address::new(body_start as u64),
                size,
                instruction_count: index.instructions.len() - first,
                truncated,
            });
            reader.seek(body_end)?;
        }

        debug!(
            "Indexed {} instruction(s) in {} function bodies",
            index.instructions.len(),
            index.bodies.len()
        );
        Ok(index)
    }

    /// Returns `true` when the body was truncated.
    fn decode_body(&mut self, body: &mut ByteReader<'_>, function_index: u32) -> bool
    {
        let locals = match skip_locals(body) {
            Ok(count) => count,
            Err(err) => {
                warn!("Function {function_index}: malformed local declarations: {err}");
                return true;
            }
        };
        trace!("Function {function_index}: {locals} local declaration(s)");

        while !body.is_empty() {
            let offset = body.position();
            match decode_instruction(body) {
                Ok((opcode, text)) => self.instructions.push(Instruction {
                    offset: Address::new(offset as u64),
                    text,
                    function_index,
                    length: body.position() - offset,
                    may_branch: !cannot_branch(opcode),
                }),
                Err(reason) => {
                    warn!("Function {function_index}: {reason} at code offset 0x{offset:x}, skipping rest of body");
                    return true;
                }
            }
        }
        false
    }

    /// Attach the names needed by [`function_name`](Self::function_name).
    #[must_use]
    pub fn with_names(mut self, imported_functions: u32, export_names: BTreeMap<u32, String>) -> Self
    {
        self.imported_functions = imported_functions;
        self.export_names = export_names;
        self
    }

    /// Export name of the 1-based body `function_index`.
    pub fn function_name(&self, function_index: u32) -> Option<&str>
    {
        let function = self.imported_functions + function_index.checked_sub(1)?;
        self.export_names.get(&function).map(String::as_str)
    }

    pub fn instructions(&self) -> &[Instruction]
    {
        &self.instructions
    }

    pub fn bodies(&self) -> &[FunctionBody]
    {
        &self.bodies
    }

    /// Index of the instruction starting exactly at `offset`.
    pub fn position(&self, offset: Address) -> Option<usize>
    {
        search_by_key(&self.instructions, &offset, |instruction| instruction.offset).ok()
    }

    /// Module offset of the next place a step starting at `module_offset`
    /// must stop.
    ///
    /// Starting from the instruction at exactly that offset, walk forward
    /// while the instruction cannot branch and still belongs to the same
    /// source line(s). Returns `None` when no instruction starts at the offset
    /// or the offset has no line information.
    pub fn next_step_boundary(
        &self,
        module_offset: u64,
        code_offset: u64,
        lines: &AddressIndex,
        rows: &[LineRow],
    ) -> Option<u64>
    {
        let address = Address::from_module_offset(module_offset, code_offset)?;
        let mut position = self.position(address)?;
        let start_key = lines.line_key(rows, address)?;

        loop {
            let instruction = &self.instructions[position];
            if instruction.may_branch {
                break;
            }
            if lines.line_key(rows, instruction.offset).as_deref() != Some(start_key.as_str()) {
                break;
            }
            match self.instructions.get(position + 1) {
                Some(next) if next.function_index == instruction.function_index => position += 1,
                _ => break,
            }
        }
        Some(self.instructions[position].offset.to_module_offset(code_offset))
    }

    pub fn len(&self) -> usize
    {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.instructions.is_empty()
    }
}

fn skip_locals(body: &mut ByteReader<'_>) -> Result<u64>
{
    let groups = body.read_uleb128()?;
    for _ in 0..groups {
        body.read_uleb128()?;
        body.read_u8()?;
    }
    Ok(groups)
}

/// Decode one instruction, returning its opcode and text.
fn decode_instruction(body: &mut ByteReader<'_>) -> std::result::Result<(u8, String), String>
{
    let opcode = body.read_u8().map_err(|err| err.to_string())?;
    let info = OPCODES[usize::from(opcode)].ok_or_else(|| format!("unknown opcode 0x{opcode:02x}"))?;
    let mut text = info.mnemonic.to_string();
    render_operands(body, info.operands, &mut text).map_err(|err| format!("bad operand for {}: {err}", info.mnemonic))?;
    Ok((opcode, text))
}

fn render_operands(body: &mut ByteReader<'_>, operands: Operands, text: &mut String) -> Result<()>
{
    match operands {
        Operands::None => {}
        Operands::Bytes(count) => {
            let bytes = body.read_block(count)?;
            match count {
                4 => {
                    let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    let _ = write!(text, " {value}");
                }
                8 => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(bytes);
                    let _ = write!(text, " {}", f64::from_le_bytes(raw));
                }
                _ => {}
            }
        }
        Operands::Leb(count) => {
            for _ in 0..count {
                let value = body.read_uleb128()?;
                let _ = write!(text, " {value}");
            }
        }
        Operands::SignedLeb => {
            let value = body.read_sleb128()?;
            let _ = write!(text, " {value}");
        }
        Operands::BlockType => {
            let block_type = body.read_sleb128()?;
            let rendered = match block_type {
                -64 => None,
                -1 => Some("i32".to_string()),
                -2 => Some("i64".to_string()),
                -3 => Some("f32".to_string()),
                -4 => Some("f64".to_string()),
                -5 => Some("v128".to_string()),
                -16 => Some("funcref".to_string()),
                -17 => Some("externref".to_string()),
                index => Some(format!("type[{index}]")),
            };
            if let Some(rendered) = rendered {
                let _ = write!(text, " (result {rendered})");
            }
        }
        Operands::MemArg => {
            let align = body.read_uleb128()?;
            let offset = body.read_uleb128()?;
            if offset != 0 {
                let _ = write!(text, " offset={offset}");
            }
            let _ = write!(text, " align={}", 1u64.checked_shl(align as u32).unwrap_or(0));
        }
        Operands::BranchTable => {
            let count = body.read_uleb128()?;
            for _ in 0..count {
                let label = body.read_uleb128()?;
                let _ = write!(text, " {label}");
            }
            let default = body.read_uleb128()?;
            let _ = write!(text, " {default}");
        }
        Operands::Misc => render_misc(body, text)?,
    }
    Ok(())
}

fn render_misc(body: &mut ByteReader<'_>, text: &mut String) -> Result<()>
{
    let sub_opcode = body.read_uleb128()?;
    let (mnemonic, operands) = match sub_opcode {
        0 => ("i32.trunc_sat_f32_s", Operands::None),
        1 => ("i32.trunc_sat_f32_u", Operands::None),
        2 => ("i32.trunc_sat_f64_s", Operands::None),
        3 => ("i32.trunc_sat_f64_u", Operands::None),
        4 => ("i64.trunc_sat_f32_s", Operands::None),
        5 => ("i64.trunc_sat_f32_u", Operands::None),
        6 => ("i64.trunc_sat_f64_s", Operands::None),
        7 => ("i64.trunc_sat_f64_u", Operands::None),
        8 => ("memory.init", Operands::Leb(1)),
        9 => ("data.drop", Operands::Leb(1)),
        10 => ("memory.copy", Operands::Bytes(2)),
        11 => ("memory.fill", Operands::Bytes(1)),
        other => {
            return Err(WasmDbgError::MalformedModule(format!("unknown 0xfc sub-opcode {other}")));
        }
    };
    text.clear();
    text.push_str(mnemonic);
    render_operands(body, operands, text)?;
    if sub_opcode == 8 {
        // memory index
        body.read_u8()?;
    }
    Ok(())
}
