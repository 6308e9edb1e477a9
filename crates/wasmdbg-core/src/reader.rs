//! # Byte Reader
//!
//! Cursor-based primitive decoding shared by every parser in this crate.
//!
//! All reads advance the cursor and fail with
//! [`WasmDbgError::OutOfBounds`] instead of panicking when the buffer is too
//! short. The encoders at the bottom of the file are the inverse of the LEB128
//! readers and are used to assemble synthetic modules in tests and tools.

use crate::error::{Result, WasmDbgError};

/// Longest LEB128 encoding of a 64-bit value.
const MAX_LEB128_BYTES: usize = 10;

/// Byte order for fixed-width reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian
{
    /// Least significant byte first (WebAssembly and DWARF-on-wasm default)
    Little,
    /// Most significant byte first
    Big,
}

/// Forward-only cursor over a byte slice.
///
/// ## Example
///
/// ```rust
/// use wasmdbg_core::reader::ByteReader;
///
/// let mut reader = ByteReader::new(&[0xe5, 0x8e, 0x26, b'h', b'i', 0]);
/// assert_eq!(reader.read_uleb128().unwrap(), 624_485);
/// assert_eq!(reader.read_cstring().unwrap(), "hi");
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a>
{
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a>
{
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self
    {
        Self { data, pos: 0 }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize
    {
        self.pos
    }

    /// Size of the underlying buffer.
    pub fn len(&self) -> usize
    {
        self.data.len()
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize
    {
        self.data.len().saturating_sub(self.pos)
    }

    /// `true` once the cursor reached the end of the buffer.
    pub fn is_empty(&self) -> bool
    {
        self.pos >= self.data.len()
    }

    /// Bytes from the cursor to the end of the buffer (does not advance).
    pub fn rest(&self) -> &'a [u8]
    {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Move the cursor to an absolute position inside the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<()>
    {
        if pos > self.data.len() {
            return Err(self.out_of_bounds(pos.saturating_sub(self.pos)));
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the cursor by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()>
    {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    fn ensure(&self, needed: usize) -> Result<()>
    {
        match self.pos.checked_add(needed) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(self.out_of_bounds(needed)),
        }
    }

    fn out_of_bounds(&self, needed: usize) -> WasmDbgError
    {
        WasmDbgError::OutOfBounds {
            offset: self.pos,
            needed,
            available: self.data.len(),
        }
    }

    /// Read `n` raw bytes.
    pub fn read_block(&mut self, n: usize) -> Result<&'a [u8]>
    {
        self.ensure(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8>
    {
        self.ensure(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub fn read_i8(&mut self) -> Result<i8>
    {
        Ok(i8::from_le_bytes([self.read_u8()?]))
    }

    pub fn read_u16(&mut self) -> Result<u16>
    {
        self.read_uint(2, Endian::Little).map(|value| value as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32>
    {
        self.read_uint(4, Endian::Little).map(|value| value as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64>
    {
        self.read_uint(8, Endian::Little)
    }

    /// Read an unsigned integer of `size` bytes (1, 2, 4 or 8).
    pub fn read_uint(&mut self, size: usize, endian: Endian) -> Result<u64>
    {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(WasmDbgError::InvalidArgument(format!("unsupported integer width {size}")));
        }
        let bytes = self.read_block(size)?;
        let mut value = 0u64;
        match endian {
            Endian::Little => {
                for (i, byte) in bytes.iter().enumerate() {
                    value |= u64::from(*byte) << (8 * i);
                }
            }
            Endian::Big => {
                for byte in bytes {
                    value = (value << 8) | u64::from(*byte);
                }
            }
        }
        Ok(value)
    }

    /// Read a two's-complement integer of `size` bytes, sign-extended to 64 bits.
    pub fn read_int(&mut self, size: usize, endian: Endian) -> Result<i64>
    {
        let raw = self.read_uint(size, endian)?;
        let unused = 64 - 8 * size as u32;
        Ok(((raw << unused) as i64) >> unused)
    }

    /// Read an unsigned LEB128 value.
    pub fn read_uleb128(&mut self) -> Result<u64>
    {
        let start = self.pos;
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            if self.pos - start >= MAX_LEB128_BYTES {
                return Err(WasmDbgError::Leb128Overflow(start));
            }
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read a signed LEB128 value.
    ///
    /// The sign bit is bit 6 of the final byte; the result is sign-extended
    /// from the number of payload bits actually consumed.
    pub fn read_sleb128(&mut self) -> Result<i64>
    {
        let start = self.pos;
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            if self.pos - start >= MAX_LEB128_BYTES {
                return Err(WasmDbgError::Leb128Overflow(start));
            }
            let byte = self.read_u8()?;
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= !0i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Read bytes up to (and consuming) a zero terminator, or to the end of the buffer.
    pub fn read_cstring(&mut self) -> Result<String>
    {
        let rest = self.rest();
        let len = rest.iter().position(|byte| *byte == 0).unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len;
        if self.pos < self.data.len() {
            self.pos += 1;
        }
        Ok(text)
    }

    /// Read a sequence of C strings terminated by an empty string.
    pub fn read_cstring_list(&mut self) -> Result<Vec<String>>
    {
        let mut items = Vec::new();
        loop {
            if self.is_empty() {
                return Err(self.out_of_bounds(1));
            }
            let item = self.read_cstring()?;
            if item.is_empty() {
                return Ok(items);
            }
            items.push(item);
        }
    }
}

/// Read a C string starting at `offset` of `table` (used for `DW_FORM_strp`).
pub fn cstring_at(table: &[u8], offset: usize) -> Result<String>
{
    let mut reader = ByteReader::new(table);
    reader.seek(offset)?;
    reader.read_cstring()
}

/// Encode `value` as unsigned LEB128.
pub fn encode_uleb128(mut value: u64) -> Vec<u8>
{
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Encode `value` as signed LEB128.
pub fn encode_sleb128(mut value: i64) -> Vec<u8>
{
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_read_fixed_widths()
    {
        let data = [0x01, 0x02, 0x03, 0x04, 0xff, 0xff];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_uint(2, Endian::Little).unwrap(), 0x0201);
        assert_eq!(reader.read_uint(2, Endian::Big).unwrap(), 0x0304);
        assert_eq!(reader.read_int(2, Endian::Little).unwrap(), -1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_past_end_is_out_of_bounds()
    {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            WasmDbgError::OutOfBounds {
                offset: 0,
                needed: 4,
                available: 2
            }
        ));
        // Cursor does not move on failure
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_sleb128_sign_extension()
    {
        assert_eq!(ByteReader::new(&[0x7f]).read_sleb128().unwrap(), -1);
        assert_eq!(ByteReader::new(&[0x80, 0x7f]).read_sleb128().unwrap(), -128);
        assert_eq!(ByteReader::new(&[0x3f]).read_sleb128().unwrap(), 63);
        assert_eq!(ByteReader::new(&[0xc0, 0x00]).read_sleb128().unwrap(), 64);
    }

    #[test]
    fn test_uleb128_overflow()
    {
        let data = [0x80u8; 11];
        let err = ByteReader::new(&data).read_uleb128().unwrap_err();
        assert!(matches!(err, WasmDbgError::Leb128Overflow(0)));
    }

    #[test]
    fn test_cstring_without_terminator()
    {
        let mut reader = ByteReader::new(b"abc");
        assert_eq!(reader.read_cstring().unwrap(), "abc");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_cstring_at_offset()
    {
        let table = b"first\0second\0";
        assert_eq!(cstring_at(table, 6).unwrap(), "second");
        assert!(cstring_at(table, 100).is_err());
    }

    #[test]
    fn test_encoders_match_known_vectors()
    {
        assert_eq!(encode_uleb128(624_485), vec![0xe5, 0x8e, 0x26]);
        assert_eq!(encode_sleb128(-123_456), vec![0xc0, 0xbb, 0x78]);
        assert_eq!(encode_sleb128(63), vec![0x3f]);
        assert_eq!(encode_sleb128(64), vec![0xc0, 0x00]);
    }
}
