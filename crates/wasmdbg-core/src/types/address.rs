//! Code address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed code address
///
/// A byte offset into the contents of the module's code section. Line rows,
/// function ranges and decoded instructions all use this coordinate system.
///
/// ## Example
///
/// ```rust
/// use wasmdbg_core::types::Address;
///
/// let addr = Address::from(0x10);
/// let next_addr = addr + 4;
/// assert_eq!(next_addr.value(), 0x14);
/// assert_eq!(next_addr.to_string(), "0x14");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// Start of the code section
    pub const ZERO: Self = Address(0);

    /// Wrap a code-section offset.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// The code-section offset.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Convert a module byte offset into a code address
    ///
    /// Returns `None` when `module_offset` lies before the code section
    /// contents (for example an offset inside the import section).
    ///
    /// ```rust
    /// use wasmdbg_core::types::Address;
    ///
    /// assert_eq!(Address::from_module_offset(0x130, 0x100), Some(Address::new(0x30)));
    /// assert_eq!(Address::from_module_offset(0x80, 0x100), None);
    /// ```
    pub fn from_module_offset(module_offset: u64, code_offset: u64) -> Option<Self>
    {
        module_offset.checked_sub(code_offset).map(Address)
    }

    /// Convert back to a module byte offset
    pub fn to_module_offset(self, code_offset: u64) -> u64
    {
        self.0.saturating_add(code_offset)
    }

    /// `self + offset`, or `None` on overflow.
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
