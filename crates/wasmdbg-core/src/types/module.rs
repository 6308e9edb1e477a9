//! Module identity.

use std::fmt;

/// Identifier of a loaded module inside a [`Session`](crate::session::Session)
///
/// Ids are assigned in load order starting at 0 and never reused, since the
/// module registry is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u32);

impl From<u32> for ModuleId
{
    fn from(id: u32) -> Self
    {
        ModuleId(id)
    }
}

impl From<ModuleId> for u32
{
    fn from(id: ModuleId) -> Self
    {
        id.0
    }
}

impl fmt::Display for ModuleId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "module#{}", self.0)
    }
}
