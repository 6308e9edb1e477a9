//! # Line-Number Program Interpreter
//!
//! Decodes `.debug_line` into a matrix of [`LineRow`]s.
//!
//! ## Header
//!
//! Each program starts with a 32-bit DWARF header: unit length, version,
//! header length, then the parameters of the special-opcode encoding and two
//! string tables (include directories and file names). The program bytecode
//! begins `header_length` bytes after the header-length field and runs to the
//! end of the unit.
//!
//! ## State machine
//!
//! The program drives a register set (see [`LineRow`]). Opcodes fall into
//! three groups:
//!
//! - **Extended** (opcode 0): a ULEB128 length, a sub-opcode and its operands
//! - **Standard** (1 to `opcode_base - 1`): fixed behaviour with ULEB128/SLEB128
//!   or fixed-size operands
//! - **Special** (`opcode_base` and above): advance address and line together
//!   and emit a row
//!
//! Registers are reset to the header defaults after every end-of-sequence row.

use gimli::constants::{self, DwLne, DwLns};
use tracing::{debug, trace, warn};

use crate::error::{Result, WasmDbgError};
use crate::reader::{ByteReader, Endian};
use crate::types::{Address, SourceLocation};

/// One entry of the header's file-name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry
{
    /// File name as stored
    pub name: String,
    /// Index into the include directories (0 = compilation directory)
    pub directory_index: u64,
    /// Modification time (usually 0)
    pub modification_time: u64,
    /// File length (usually 0)
    pub length: u64,
    /// Directory and name joined
    pub path: String,
}

/// Decoded line program header.
#[derive(Debug, Clone)]
pub struct LineProgramHeader
{
    /// Offset of the program within `.debug_line`
    pub offset: usize,
    pub unit_length: u32,
    pub version: u16,
    pub header_length: u32,
    pub minimum_instruction_length: u8,
    pub maximum_operations_per_instruction: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    /// Operand counts of standard opcodes `1..opcode_base`
    pub standard_opcode_lengths: Vec<u8>,
    pub include_directories: Vec<String>,
    pub file_names: Vec<FileEntry>,
    /// First byte of the bytecode, section-relative
    program_start: usize,
    /// One past the last byte of the unit, section-relative
    unit_end: usize,
}

impl LineProgramHeader
{
    /// Decode the header of the program starting at `offset`.
    pub fn parse(section: &[u8], offset: usize) -> Result<Self>
    {
        let mut reader = ByteReader::new(section);
        reader.seek(offset)?;

        let unit_length = reader.read_u32()?;
        if unit_length == 0xffff_ffff {
            return Err(WasmDbgError::MalformedModule("64-bit DWARF line programs are not supported".to_string()));
        }
        let unit_end = reader.position() + unit_length as usize;
        if unit_end > section.len() {
            return Err(WasmDbgError::OutOfBounds {
                offset: reader.position(),
                needed: unit_length as usize,
                available: section.len(),
            });
        }

        let version = reader.read_u16()?;
        if !(2..=4).contains(&version) {
            return Err(WasmDbgError::UnsupportedUnitVersion(version));
        }
        let header_length = reader.read_u32()?;
        let program_start = reader.position() + header_length as usize;

        let minimum_instruction_length = reader.read_u8()?;
        if minimum_instruction_length != 1 {
            return Err(WasmDbgError::UnsupportedInstructionLength(minimum_instruction_length));
        }
        let maximum_operations_per_instruction = if version >= 4 { reader.read_u8()?.max(1) } else { 1 };
        let default_is_stmt = reader.read_u8()? != 0;
        let line_base = reader.read_i8()?;
        let line_range = reader.read_u8()?;
        if line_range == 0 {
            return Err(WasmDbgError::InvalidLineRange);
        }
        let opcode_base = reader.read_u8()?;
        let standard_opcode_lengths = reader.read_block(usize::from(opcode_base.saturating_sub(1)))?.to_vec();

        let include_directories = reader.read_cstring_list()?;

        let mut file_names = Vec::new();
        loop {
            let name = reader.read_cstring()?;
            if name.is_empty() {
                break;
            }
            let directory_index = reader.read_uleb128()?;
            let modification_time = reader.read_uleb128()?;
            let length = reader.read_uleb128()?;
            file_names.push(FileEntry {
                path: join_path(&include_directories, directory_index, &name),
                name,
                directory_index,
                modification_time,
                length,
            });
        }

        Ok(Self {
            offset,
            unit_length,
            version,
            header_length,
            minimum_instruction_length,
            maximum_operations_per_instruction,
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            standard_opcode_lengths,
            include_directories,
            file_names,
            program_start,
            unit_end,
        })
    }

    /// Offset of the next program in the section.
    pub fn next_offset(&self) -> usize
    {
        self.unit_end
    }

    /// Full path of the 1-based file `index`.
    pub fn file_path(&self, index: u64) -> Option<&str>
    {
        let slot = usize::try_from(index.checked_sub(1)?).ok()?;
        self.file_names.get(slot).map(|file| file.path.as_str())
    }

    /// Paths of all files, in table order.
    pub fn file_paths(&self) -> Vec<String>
    {
        self.file_names.iter().map(|file| file.path.clone()).collect()
    }

    /// Execute the program and return its rows.
    pub fn run(&self, section: &[u8]) -> Result<Vec<LineRow>>
    {
        let mut machine = LineMachine::new(self);
        let mut reader = ByteReader::new(&section[..self.unit_end]);
        reader.seek(self.program_start)?;
        while !reader.is_empty() {
            machine.step(&mut reader)?;
        }
        Ok(machine.rows)
    }
}

fn join_path(include_directories: &[String], directory_index: u64, name: &str) -> String
{
    if directory_index == 0 {
        return format!("./{name}");
    }
    let directory = usize::try_from(directory_index - 1)
        .ok()
        .and_then(|slot| include_directories.get(slot));
    match directory {
        Some(directory) => format!("{directory}/{name}"),
        None => name.to_string(),
    }
}

/// One row of the line-number matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRow
{
    /// Code address (relative to the code section contents)
    pub address: Address,
    pub op_index: u64,
    /// Resolved full path of the file register, empty if out of range
    pub file: String,
    pub line: u64,
    pub column: u64,
    pub is_stmt: bool,
    pub basic_block: bool,
    pub end_sequence: bool,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
    pub isa: u64,
    pub discriminator: u64,
}

impl LineRow
{
    /// Source location described by this row.
    pub fn location(&self) -> SourceLocation
    {
        SourceLocation {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone)]
struct Registers
{
    address: u64,
    op_index: u64,
    file: u64,
    line: u64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_sequence: bool,
    prologue_end: bool,
    epilogue_begin: bool,
    isa: u64,
    discriminator: u64,
}

impl Registers
{
    fn new(default_is_stmt: bool) -> Self
    {
        Self {
            address: 0,
            op_index: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }
}

struct LineMachine<'h>
{
    header: &'h LineProgramHeader,
    /// Files added with `DW_LNE_define_file`
    extra_files: Vec<String>,
    regs: Registers,
    rows: Vec<LineRow>,
}

impl<'h> LineMachine<'h>
{
    fn new(header: &'h LineProgramHeader) -> Self
    {
        Self {
            header,
            extra_files: Vec::new(),
            regs: Registers::new(header.default_is_stmt),
            rows: Vec::new(),
        }
    }

    fn file_path(&self, index: u64) -> String
    {
        if let Some(path) = self.header.file_path(index) {
            return path.to_string();
        }
        let slot = index
            .checked_sub(1 + self.header.file_names.len() as u64)
            .and_then(|slot| usize::try_from(slot).ok());
        slot.and_then(|slot| self.extra_files.get(slot)).cloned().unwrap_or_default()
    }

    fn emit_row(&mut self)
    {
        let regs = &self.regs;
        let row = LineRow {
            address: Address::new(regs.address),
            op_index: regs.op_index,
            file: self.file_path(regs.file),
            line: regs.line,
            column: regs.column,
            is_stmt: regs.is_stmt,
            basic_block: regs.basic_block,
            end_sequence: regs.end_sequence,
            prologue_end: regs.prologue_end,
            epilogue_begin: regs.epilogue_begin,
            isa: regs.isa,
            discriminator: regs.discriminator,
        };
        self.rows.push(row);
    }

    fn emit_row_and_clear(&mut self)
    {
        self.emit_row();
        self.regs.basic_block = false;
        self.regs.prologue_end = false;
        self.regs.epilogue_begin = false;
        self.regs.discriminator = 0;
    }

    fn advance(&mut self, operation_advance: u64)
    {
        let max_ops = u64::from(self.header.maximum_operations_per_instruction);
        let min_len = u64::from(self.header.minimum_instruction_length);
        let total = self.regs.op_index.wrapping_add(operation_advance);
        self.regs.address = self.regs.address.wrapping_add(min_len * (total / max_ops));
        self.regs.op_index = total % max_ops;
    }

    fn step(&mut self, reader: &mut ByteReader<'_>) -> Result<()>
    {
        let opcode = reader.read_u8()?;
        if opcode >= self.header.opcode_base {
            let adjusted = opcode - self.header.opcode_base;
            let line_range = self.header.line_range;
            self.advance(u64::from(adjusted / line_range));
            let line_delta = i64::from(self.header.line_base) + i64::from(adjusted % line_range);
            self.regs.line = self.regs.line.saturating_add_signed(line_delta);
            self.emit_row_and_clear();
            return Ok(());
        }
        if opcode == 0 {
            return self.extended(reader);
        }

        match DwLns(opcode) {
            constants::DW_LNS_copy => self.emit_row_and_clear(),
            constants::DW_LNS_advance_pc => {
                let operation_advance = reader.read_uleb128()?;
                self.advance(operation_advance);
            }
            constants::DW_LNS_advance_line => {
                let delta = reader.read_sleb128()?;
                self.regs.line = self.regs.line.saturating_add_signed(delta);
            }
            constants::DW_LNS_set_file => self.regs.file = reader.read_uleb128()?,
            constants::DW_LNS_set_column => self.regs.column = reader.read_uleb128()?,
            constants::DW_LNS_negate_stmt => self.regs.is_stmt = !self.regs.is_stmt,
            constants::DW_LNS_set_basic_block => self.regs.basic_block = true,
            constants::DW_LNS_const_add_pc => {
                let adjusted = 255 - self.header.opcode_base;
                self.advance(u64::from(adjusted / self.header.line_range));
            }
            constants::DW_LNS_fixed_advance_pc => {
                let delta = reader.read_u16()?;
                self.regs.address = self.regs.address.wrapping_add(u64::from(delta));
                self.regs.op_index = 0;
            }
            constants::DW_LNS_set_prologue_end => self.regs.prologue_end = true,
            constants::DW_LNS_set_epilogue_begin => self.regs.epilogue_begin = true,
            constants::DW_LNS_set_isa => self.regs.isa = reader.read_uleb128()?,
            unknown => {
                let operands = self
                    .header
                    .standard_opcode_lengths
                    .get(usize::from(opcode) - 1)
                    .copied()
                    .unwrap_or(0);
                trace!("Skipping unknown standard opcode {unknown} with {operands} operand(s)");
                for _ in 0..operands {
                    reader.read_uleb128()?;
                }
            }
        }
        Ok(())
    }

    fn extended(&mut self, reader: &mut ByteReader<'_>) -> Result<()>
    {
        let len = reader.read_uleb128()? as usize;
        if len == 0 {
            return Ok(());
        }
        let body_start = reader.position();
        let body_end = body_start.checked_add(len).ok_or(WasmDbgError::Leb128Overflow(body_start))?;
        let sub_opcode = reader.read_u8()?;

        match DwLne(sub_opcode) {
            constants::DW_LNE_end_sequence => {
                self.regs.end_sequence = true;
                self.emit_row();
                self.regs = Registers::new(self.header.default_is_stmt);
            }
            constants::DW_LNE_set_address => {
                self.regs.address = match len - 1 {
                    size @ (1 | 2 | 4 | 8) => reader.read_uint(size, Endian::Little)?,
                    other => {
                        return Err(WasmDbgError::MalformedModule(format!(
                            "DW_LNE_set_address with a {other}-byte operand"
                        )));
                    }
                };
                self.regs.op_index = 0;
            }
            constants::DW_LNE_define_file => {
                let name = reader.read_cstring()?;
                let directory_index = reader.read_uleb128()?;
                reader.read_uleb128()?;
                reader.read_uleb128()?;
                self.extra_files
                    .push(join_path(&self.header.include_directories, directory_index, &name));
            }
            constants::DW_LNE_set_discriminator => self.regs.discriminator = reader.read_uleb128()?,
            unknown => trace!("Skipping unknown extended opcode {unknown} ({len} byte(s))"),
        }

        reader.seek(body_end)
    }
}

/// Every program of a `.debug_line` section, with the rows of the first one.
///
/// Only the first program is executed; the others are decoded so callers can
/// report how many were ignored.
#[derive(Debug, Clone, Default)]
pub struct LineTable
{
    headers: Vec<LineProgramHeader>,
    rows: Vec<LineRow>,
}

impl LineTable
{
    /// Decode `.debug_line`.
    pub fn parse(section: &[u8]) -> Result<Self>
    {
        if section.is_empty() {
            return Ok(Self::default());
        }

        let first = LineProgramHeader::parse(section, 0)?;
        let rows = first.run(section)?;
        debug!(
            "Line program v{} with {} file(s) produced {} row(s)",
            first.version,
            first.file_names.len(),
            rows.len()
        );

        let mut offset = first.next_offset();
        let mut headers = vec![first];
        while offset < section.len() {
            match LineProgramHeader::parse(section, offset) {
                Ok(header) => {
                    offset = header.next_offset();
                    headers.push(header);
                }
                Err(err) => {
                    warn!("Stopped scanning .debug_line at 0x{offset:x}: {err}");
                    break;
                }
            }
        }

        Ok(Self { headers, rows })
    }

    /// Number of line programs in the section.
    pub fn program_count(&self) -> usize
    {
        self.headers.len()
    }

    /// Header of the executed program.
    pub fn header(&self) -> Option<&LineProgramHeader>
    {
        self.headers.first()
    }

    /// All decoded headers.
    pub fn headers(&self) -> &[LineProgramHeader]
    {
        &self.headers
    }

    /// Rows of the executed program, in emission order.
    pub fn rows(&self) -> &[LineRow]
    {
        &self.rows
    }

    /// Path table of the executed program (empty when there is none).
    pub fn file_paths(&self) -> Vec<String>
    {
        self.header().map(LineProgramHeader::file_paths).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    /// Version 4 header with one include directory and two files.
    fn header_bytes(program: &[u8]) -> Vec<u8>
    {
        let mut after_header_length = vec![
            1,    // minimum_instruction_length
            1,    // maximum_operations_per_instruction
            1,    // default_is_stmt
            0xfb, // line_base = -5
            14,   // line_range
            13,   // opcode_base
        ];
        after_header_length.extend([0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        after_header_length.extend(b"src\0\0");
        after_header_length.extend(b"a.c\0\x01\0\0");
        after_header_length.extend(b"b.c\0\x00\0\0");
        after_header_length.push(0);

        let mut after_length = 4u16.to_le_bytes().to_vec();
        after_length.extend((after_header_length.len() as u32).to_le_bytes());
        after_length.extend(after_header_length);
        after_length.extend_from_slice(program);

        let mut out = (after_length.len() as u32).to_le_bytes().to_vec();
        out.extend(after_length);
        out
    }

    #[test]
    fn test_header_paths()
    {
        let section = header_bytes(&[]);
        let header = LineProgramHeader::parse(&section, 0).unwrap();
        assert_eq!(header.file_path(1), Some("src/a.c"));
        assert_eq!(header.file_path(2), Some("./b.c"));
        assert_eq!(header.file_path(0), None);
        assert_eq!(header.file_path(3), None);
        assert_eq!(header.line_base, -5);
    }

    #[test]
    fn test_const_add_pc_and_fixed_advance()
    {
        // const_add_pc: (255 - 13) / 14 = 17; fixed_advance_pc 0x0100; copy
        let section = header_bytes(&[8, 9, 0x00, 0x01, 1]);
        let table = LineTable::parse(&section).unwrap();
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.rows()[0].address, Address::new(17 + 0x100));
        assert_eq!(table.rows()[0].line, 1);
    }

    #[test]
    fn test_out_of_range_file_gives_empty_path()
    {
        // set_file 9, copy
        let section = header_bytes(&[4, 9, 1]);
        let table = LineTable::parse(&section).unwrap();
        assert_eq!(table.rows()[0].file, "");
    }

    #[test]
    fn test_define_file_extends_table()
    {
        // define_file "c.c" dir 1; set_file 3; copy
        let section = header_bytes(&[0, 8, 3, b'c', b'.', b'c', 0, 1, 0, 0, 4, 3, 1]);
        let table = LineTable::parse(&section).unwrap();
        assert_eq!(table.rows()[0].file, "src/c.c");
    }

    #[test]
    fn test_rejects_instruction_length()
    {
        let mut section = header_bytes(&[]);
        // minimum_instruction_length follows unit_length (4), version (2), header_length (4)
        section[10] = 4;
        let err = LineProgramHeader::parse(&section, 0).unwrap_err();
        assert!(matches!(err, WasmDbgError::UnsupportedInstructionLength(4)));
    }

    #[test]
    fn test_counts_every_program()
    {
        let mut section = header_bytes(&[1]);
        section.extend(header_bytes(&[1, 1]));
        let table = LineTable::parse(&section).unwrap();
        assert_eq!(table.program_count(), 2);
        assert_eq!(table.rows().len(), 1);
    }
}
