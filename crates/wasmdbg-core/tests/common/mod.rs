//! Synthetic modules and DWARF sections for integration tests.
//!
//! The default fixture is a module exporting one function:
//!
//! ```text
//! add(a: int, b: int)        code-relative
//!   local.get 0              0x3   line 1
//!   local.get 1              0x5   line 2
//!   i32.add                  0x7   line 2
//!   end                      0x8   line 2
//! ```

#![allow(dead_code)]

use wasmdbg_core::reader::encode_uleb128;

/// Code-relative start of the `add` body.
pub const ADD_LOW_PC: u32 = 2;
/// Length of the `add` body.
pub const ADD_LENGTH: u32 = 7;
/// Code-relative address of the second line row.
pub const SECOND_ROW: u64 = 5;

/// Body of `add`: no locals, `local.get 0`, `local.get 1`, `i32.add`, `end`.
pub const ADD_BODY: &[u8] = &[0, 0x20, 0, 0x20, 1, 0x6a, 0x0b];

/// set_file 1, set_address 0x3, copy, special (+2 address, +1 line),
/// advance_pc 4, end_sequence.
pub const ADD_LINES: &[u8] = &[4, 1, 0, 5, 2, 3, 0, 0, 0, 1, 47, 2, 4, 0, 1, 1];

/// 1: compile_unit (producer strp, name string), children
/// 2: subprogram (name, low_pc addr, high_pc data4), children
/// 3: formal_parameter (name, type ref4)
/// 4: base_type (name, encoding data1, byte_size data1)
#[rustfmt::skip]
pub const ABBREV: &[u8] = &[
    1, 0x11, 1, 0x25, 0x0e, 0x03, 0x08, 0, 0,
    2, 0x2e, 1, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0, 0,
    3, 0x05, 0, 0x03, 0x08, 0x49, 0x13, 0, 0,
    4, 0x24, 0, 0x03, 0x08, 0x3e, 0x0b, 0x0b, 0x0b, 0, 0,
    0,
];

pub const DEBUG_STR: &[u8] = b"clang 17\0";

/// Assembles a module binary section by section.
#[derive(Debug, Default)]
pub struct ModuleBuilder
{
    sections: Vec<(u8, Vec<u8>)>,
}

impl ModuleBuilder
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn section(mut self, id: u8, contents: Vec<u8>) -> Self
    {
        self.sections.push((id, contents));
        self
    }

    pub fn custom(self, name: &str, payload: &[u8]) -> Self
    {
        let mut contents = encode_uleb128(name.len() as u64);
        contents.extend_from_slice(name.as_bytes());
        contents.extend_from_slice(payload);
        self.section(0, contents)
    }

    /// Code section holding `bodies` (each starting with its local declarations).
    pub fn code(self, bodies: &[&[u8]]) -> Self
    {
        let mut contents = encode_uleb128(bodies.len() as u64);
        for body in bodies {
            contents.extend(encode_uleb128(body.len() as u64));
            contents.extend_from_slice(body);
        }
        self.section(10, contents)
    }

    /// Export section with function exports only.
    pub fn exports(self, exports: &[(&str, u32)]) -> Self
    {
        let mut contents = encode_uleb128(exports.len() as u64);
        for (name, index) in exports {
            contents.extend(encode_uleb128(name.len() as u64));
            contents.extend_from_slice(name.as_bytes());
            contents.push(0);
            contents.extend(encode_uleb128(u64::from(*index)));
        }
        self.section(7, contents)
    }

    pub fn build(&self) -> Vec<u8>
    {
        let mut out = b"\0asm\x01\0\0\0".to_vec();
        for (id, contents) in &self.sections {
            out.push(*id);
            out.extend(encode_uleb128(contents.len() as u64));
            out.extend_from_slice(contents);
        }
        out
    }
}

/// Version 4 line program: one directory `src`, file `add.c` in it,
/// line_base -5, line_range 14, opcode_base 13.
pub fn line_program(program: &[u8]) -> Vec<u8>
{
    let mut header = vec![1, 1, 1, 0xfb, 14, 13];
    header.extend([0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    header.extend(b"src\0\0");
    header.extend(b"add.c\0\x01\0\0");
    header.push(0);

    let mut unit = 4u16.to_le_bytes().to_vec();
    unit.extend((header.len() as u32).to_le_bytes());
    unit.extend(header);
    unit.extend_from_slice(program);

    let mut out = (unit.len() as u32).to_le_bytes().to_vec();
    out.extend(unit);
    out
}

/// Version 4 `.debug_info` unit (address size 4) around `body`.
pub fn info_unit(body: &[u8]) -> Vec<u8>
{
    let mut out = ((body.len() + 7) as u32).to_le_bytes().to_vec();
    out.extend(4u16.to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.push(4);
    out.extend_from_slice(body);
    out
}

/// Debug info for `add` with the given parameter names.
///
/// Parameters reference `int` unless `type_offset` points them elsewhere.
pub fn add_info(params: &[&str], type_offset: Option<u32>) -> Vec<u8>
{
    // Unit header is 11 bytes
    let mut body = vec![1, 0, 0, 0, 0];
    body.extend(b"add.c\0");

    let int_offset = 11 + body.len() as u32;
    body.extend([4, b'i', b'n', b't', 0, 5, 4]);

    body.extend([2, b'a', b'd', b'd', 0]);
    body.extend(ADD_LOW_PC.to_le_bytes());
    body.extend(ADD_LENGTH.to_le_bytes());
    for name in params {
        body.push(3);
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend(type_offset.unwrap_or(int_offset).to_le_bytes());
    }
    body.push(0);
    body.push(0);
    info_unit(&body)
}

/// Module with the `add` fixture and the given debug sections.
pub fn module_with(line: &[u8], abbrev: &[u8], info: &[u8]) -> Vec<u8>
{
    ModuleBuilder::new()
        .exports(&[("add", 0)])
        .code(&[ADD_BODY])
        .custom(".debug_line", line)
        .custom(".debug_str", DEBUG_STR)
        .custom(".debug_abbrev", abbrev)
        .custom(".debug_info", info)
        .build()
}

/// The default fixture.
pub fn add_module() -> Vec<u8>
{
    module_with(&line_program(ADD_LINES), ABBREV, &add_info(&["a", "b"], None))
}
