//! # Module Section Reader
//!
//! Splits a WebAssembly binary into its sections.
//!
//! A module is an 8-byte preamble (`\0asm` plus a little-endian version)
//! followed by sections, each encoded as a one-byte id, a ULEB128 content
//! length and the contents. Custom sections (id 0) start with a
//! length-prefixed name; the DWARF sections travel as custom sections named
//! `.debug_line`, `.debug_info` and so on.
//!
//! Besides the raw split, this module decodes the two standard sections the
//! debugger needs for naming functions: the import section (to count imported
//! functions) and the export section (to name exported ones).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{Result, WasmDbgError};
use crate::reader::ByteReader;

/// `\0asm`
pub const WASM_MAGIC: [u8; 4] = *b"\0asm";

/// Size of the magic plus version preamble.
pub const PREAMBLE_LEN: usize = 8;

/// Custom section id
pub const CUSTOM_SECTION: u8 = 0;
/// Import section id
pub const IMPORT_SECTION: u8 = 2;
/// Export section id
pub const EXPORT_SECTION: u8 = 7;
/// Code section id
pub const CODE_SECTION: u8 = 10;

/// Custom sections a module needs for line and type information.
pub const REQUIRED_DEBUG_SECTIONS: [&str; 4] = [".debug_line", ".debug_str", ".debug_abbrev", ".debug_info"];

/// Import/export kind of a function
const EXTERNAL_KIND_FUNCTION: u8 = 0;

/// One section of a module binary.
#[derive(Debug, Clone)]
pub struct Section<'a>
{
    /// Section id (0 for custom sections)
    pub id: u8,
    /// Offset of the section *contents* within the module binary
    pub byte_offset: usize,
    /// Section contents (for custom sections this includes the name prefix)
    pub bytes: &'a [u8],
    /// Name of a custom section
    pub name: Option<String>,
    /// Contents after the name for custom sections, the whole contents otherwise
    pub payload: &'a [u8],
}

impl Section<'_>
{
    /// Human readable section kind, as listed by the `sections` command.
    pub fn kind(&self) -> &'static str
    {
        match self.id {
            0 => "custom",
            1 => "type",
            2 => "import",
            3 => "function",
            4 => "table",
            5 => "memory",
            6 => "global",
            7 => "export",
            8 => "start",
            9 => "element",
            10 => "code",
            11 => "data",
            12 => "datacount",
            13 => "tag",
            _ => "unknown",
        }
    }
}

/// Ordered sections of a module plus a name index of its custom sections.
#[derive(Debug, Clone)]
pub struct ModuleSections<'a>
{
    sections: Vec<Section<'a>>,
    custom: HashMap<String, usize>,
}

impl<'a> ModuleSections<'a>
{
    /// Split `binary` into sections.
    ///
    /// The preamble is skipped when present, so a bare sequence of sections is
    /// accepted too. A truncated section fails the whole split.
    pub fn parse(binary: &'a [u8]) -> Result<Self>
    {
        let mut reader = ByteReader::new(binary);
        if binary.len() >= PREAMBLE_LEN && binary[..4] == WASM_MAGIC {
            reader.skip(PREAMBLE_LEN)?;
        }

        let mut sections = Vec::new();
        let mut custom = HashMap::new();
        while !reader.is_empty() {
            let id = reader.read_u8()?;
            let len = read_len(&mut reader)?;
            let byte_offset = reader.position();
            let bytes = reader.read_block(len).map_err(|_| {
                WasmDbgError::MalformedModule(format!(
                    "section {id} at 0x{byte_offset:x} declares {len} bytes but only {} remain",
                    binary.len() - byte_offset
                ))
            })?;

            let (name, payload) = if id == CUSTOM_SECTION {
                let mut inner = ByteReader::new(bytes);
                let name_len = read_len(&mut inner)?;
                let name = String::from_utf8_lossy(inner.read_block(name_len)?).into_owned();
                (Some(name), inner.rest())
            } else {
                (None, bytes)
            };

            trace!("section id={id} offset=0x{byte_offset:x} len={len} name={name:?}");
            if let Some(name) = &name {
                // First occurrence wins
                custom.entry(name.clone()).or_insert(sections.len());
            }
            sections.push(Section {
                id,
                byte_offset,
                bytes,
                name,
                payload,
            });
        }

        debug!("Read {} section(s), {} custom", sections.len(), custom.len());
        Ok(Self { sections, custom })
    }

    /// All sections in file order.
    pub fn sections(&self) -> &[Section<'a>]
    {
        &self.sections
    }

    /// First section with the given id.
    pub fn section(&self, id: u8) -> Option<&Section<'a>>
    {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Payload of the custom section called `name`.
    pub fn custom(&self, name: &str) -> Option<&'a [u8]>
    {
        self.custom.get(name).map(|index| self.sections[*index].payload)
    }

    /// Names of the custom sections, in file order.
    pub fn custom_names(&self) -> Vec<&str>
    {
        self.sections.iter().filter_map(|section| section.name.as_deref()).collect()
    }

    /// Offset of the code section contents within the module.
    pub fn code_offset(&self) -> Option<usize>
    {
        self.section(CODE_SECTION).map(|section| section.byte_offset)
    }

    /// Required debug sections that are absent.
    pub fn missing_debug_sections(&self) -> Vec<&'static str>
    {
        REQUIRED_DEBUG_SECTIONS
            .iter()
            .copied()
            .filter(|name| !self.custom.contains_key(*name))
            .collect()
    }

    /// Function exports as function index → export name.
    ///
    /// Table, memory, global and tag exports are skipped.
    pub fn exports(&self) -> Result<BTreeMap<u32, String>>
    {
        let mut exports = BTreeMap::new();
        let Some(section) = self.section(EXPORT_SECTION) else {
            return Ok(exports);
        };

        let mut reader = ByteReader::new(section.bytes);
        let count = reader.read_uleb128()?;
        for _ in 0..count {
            let name = read_name(&mut reader)?;
            let kind = reader.read_u8()?;
            let index = read_index(&mut reader)?;
            if kind == EXTERNAL_KIND_FUNCTION {
                exports.insert(index, name);
            }
        }
        Ok(exports)
    }

    /// Number of imported functions.
    ///
    /// Function indices count imports first, so code body `k` (0-based)
    /// defines function `imported_function_count() + k`.
    pub fn imported_function_count(&self) -> Result<u32>
    {
        let Some(section) = self.section(IMPORT_SECTION) else {
            return Ok(0);
        };

        let mut reader = ByteReader::new(section.bytes);
        let count = reader.read_uleb128()?;
        let mut functions = 0u32;
        for _ in 0..count {
            read_name(&mut reader)?;
            read_name(&mut reader)?;
            match reader.read_u8()? {
                // function: type index
                0 => {
                    reader.read_uleb128()?;
                    functions += 1;
                }
                // table: reftype, limits
                1 => {
                    reader.read_u8()?;
                    skip_limits(&mut reader)?;
                }
                // memory: limits
                2 => skip_limits(&mut reader)?,
                // global: valtype, mutability
                3 => {
                    reader.skip(2)?;
                }
                // tag: attribute, type index
                4 => {
                    reader.read_u8()?;
                    reader.read_uleb128()?;
                }
                other => {
                    return Err(WasmDbgError::MalformedModule(format!("unknown import kind {other}")));
                }
            }
        }
        Ok(functions)
    }
}

fn read_len(reader: &mut ByteReader<'_>) -> Result<usize>
{
    let value = reader.read_uleb128()?;
    usize::try_from(value).map_err(|_| WasmDbgError::MalformedModule(format!("length {value} does not fit in memory")))
}

fn read_index(reader: &mut ByteReader<'_>) -> Result<u32>
{
    let value = reader.read_uleb128()?;
    u32::try_from(value).map_err(|_| WasmDbgError::MalformedModule(format!("index {value} exceeds 32 bits")))
}

fn read_name(reader: &mut ByteReader<'_>) -> Result<String>
{
    let len = read_len(reader)?;
    Ok(String::from_utf8_lossy(reader.read_block(len)?).into_owned())
}

/// Read a module file, rejecting files that do not start with `\0asm`.
///
/// ## Errors
///
/// [`WasmDbgError::Io`] if the file cannot be read,
/// [`WasmDbgError::MalformedModule`] if it is not a WebAssembly binary.
pub fn read_module_file(path: &Path) -> Result<Vec<u8>>
{
    let binary = fs::read(path)?;
    if binary.len() < PREAMBLE_LEN || binary[..4] != WASM_MAGIC {
        return Err(WasmDbgError::MalformedModule(format!(
            "{} is not a WebAssembly module",
            path.display()
        )));
    }
    debug!("Read {} ({} bytes)", path.display(), binary.len());
    Ok(binary)
}

fn skip_limits(reader: &mut ByteReader<'_>) -> Result<()>
{
    let flags = reader.read_u8()?;
    reader.read_uleb128()?;
    if flags & 1 != 0 {
        reader.read_uleb128()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn custom_section(name: &str, payload: &[u8]) -> Vec<u8>
    {
        let mut contents = vec![name.len() as u8];
        contents.extend_from_slice(name.as_bytes());
        contents.extend_from_slice(payload);
        let mut out = vec![CUSTOM_SECTION, contents.len() as u8];
        out.extend(contents);
        out
    }

    #[test]
    fn test_read_module_file()
    {
        let dir = std::env::temp_dir().join(format!("wasmdbg-sections-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let module = dir.join("ok.wasm");
        fs::write(&module, b"\0asm\x01\0\0\0").unwrap();
        assert_eq!(read_module_file(&module).unwrap().len(), PREAMBLE_LEN);

        let text = dir.join("notes.txt");
        fs::write(&text, b"not a module").unwrap();
        assert!(matches!(read_module_file(&text), Err(WasmDbgError::MalformedModule(_))));

        assert!(matches!(read_module_file(&dir.join("missing.wasm")), Err(WasmDbgError::Io(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_parse_without_preamble()
    {
        let mut binary = custom_section(".debug_str", b"abc\0");
        binary.extend([CODE_SECTION, 2, 0x00, 0x0b]);

        let sections = ModuleSections::parse(&binary).unwrap();
        assert_eq!(sections.sections().len(), 2);
        assert_eq!(sections.custom(".debug_str"), Some(&b"abc\0"[..]));
        assert_eq!(sections.code_offset(), Some(binary.len() - 2));
    }

    #[test]
    fn test_first_custom_section_wins()
    {
        let mut binary = WASM_MAGIC.to_vec();
        binary.extend([1, 0, 0, 0]);
        binary.extend(custom_section("dup", b"one"));
        binary.extend(custom_section("dup", b"two"));

        let sections = ModuleSections::parse(&binary).unwrap();
        assert_eq!(sections.custom("dup"), Some(&b"one"[..]));
        assert_eq!(sections.custom_names(), vec!["dup", "dup"]);
    }

    #[test]
    fn test_truncated_section_is_malformed()
    {
        let binary = [CODE_SECTION, 10, 0x00];
        let err = ModuleSections::parse(&binary).unwrap_err();
        assert!(matches!(err, WasmDbgError::MalformedModule(_)));
    }

    #[test]
    fn test_imports_and_exports()
    {
        let mut binary = Vec::new();
        // import section: env.log (func), env.mem (memory, min 1)
        let imports = [
            2, 3, b'e', b'n', b'v', 3, b'l', b'o', b'g', 0, 0, 3, b'e', b'n', b'v', 3, b'm', b'e', b'm', 2, 0, 1,
        ];
        binary.push(IMPORT_SECTION);
        binary.push(imports.len() as u8);
        binary.extend(imports);
        // export section: "add" func 1, "memory" memory 0
        let exports = [2, 3, b'a', b'd', b'd', 0, 1, 6, b'm', b'e', b'm', b'o', b'r', b'y', 2, 0];
        binary.push(EXPORT_SECTION);
        binary.push(exports.len() as u8);
        binary.extend(exports);

        let sections = ModuleSections::parse(&binary).unwrap();
        assert_eq!(sections.imported_function_count().unwrap(), 1);
        let exports = sections.exports().unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports.get(&1).map(String::as_str), Some("add"));
        assert_eq!(sections.missing_debug_sections().len(), 4);
    }
}
