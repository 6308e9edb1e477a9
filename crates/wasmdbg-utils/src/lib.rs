//! # wasmdbg Utilities
//!
//! Shared utilities and logging for wasmdbg.
//!
//! This crate provides the logging setup used by the command-line front end,
//! built on `tracing`. The core library only emits events; installing a
//! subscriber is left to whoever embeds it.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogGuard, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
