//! # Session Configuration
//!
//! Limits applied while formatting values.
//!
//! ## Environment Variables
//!
//! - `WASMDBG_MAX_CSTRING`: longest C string read through a `char*` (default 100)
//! - `WASMDBG_MAX_DEPTH`: deepest nesting of structs and pointers (default 32)

use std::env;
use std::str::FromStr;

use tracing::warn;

/// Default number of bytes decoded for a `char*` value.
pub const DEFAULT_MAX_C_STRING_LEN: usize = 100;

/// Default nesting limit of the value resolver.
pub const DEFAULT_MAX_VALUE_DEPTH: usize = 32;

/// Size of a linear-memory pointer (wasm32).
pub const WASM32_POINTER_SIZE: usize = 4;

/// Value formatting limits shared by every module of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig
{
    /// Bytes read when a `signed char` is reached through a pointer
    pub max_c_string_len: usize,
    /// Nested structs/pointers deeper than this are not expanded
    pub max_value_depth: usize,
    /// Width of a pointer stored in linear memory
    pub pointer_size: usize,
}

impl Default for SessionConfig
{
    fn default() -> Self
    {
        Self {
            max_c_string_len: DEFAULT_MAX_C_STRING_LEN,
            max_value_depth: DEFAULT_MAX_VALUE_DEPTH,
            pointer_size: WASM32_POINTER_SIZE,
        }
    }
}

impl SessionConfig
{
    /// Defaults overridden by `WASMDBG_MAX_CSTRING` and `WASMDBG_MAX_DEPTH`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        if let Some(value) = read_env("WASMDBG_MAX_CSTRING") {
            config.max_c_string_len = value;
        }
        if let Some(value) = read_env("WASMDBG_MAX_DEPTH") {
            config.max_value_depth = value;
        }
        config
    }
}

fn read_env<T: FromStr>(name: &str) -> Option<T>
{
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {name}={raw:?}: not a number");
            None
        }
    }
}
