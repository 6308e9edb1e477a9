//! Session event types and helpers.
//!
//! Front ends consume these events to react to modules being loaded without
//! polling the session. [`Session`](crate::session::Session) publishes one
//! event per call to `module_loaded`.

use std::sync::mpsc;

use crate::types::ModuleId;

/// Event emitted by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent
{
    /// A module was parsed and registered.
    ModuleLoaded
    {
        id: ModuleId,
        /// Number of functions in its debug info.
        functions: usize,
    },
    /// A module was registered but its debug info could not be used.
    ModuleParseFailed
    {
        id: ModuleId,
        /// Status title, e.g. `Parse Error`.
        title: String,
        message: String,
    },
}

impl SessionEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::ModuleLoaded { id, functions } => format!("Loaded {id} with {functions} function(s)"),
            Self::ModuleParseFailed { id, title, message } => format!("{id}: {title} ({message})"),
        }
    }

    /// Module the event refers to.
    #[must_use]
    pub fn module(&self) -> ModuleId
    {
        match self {
            Self::ModuleLoaded { id, .. } | Self::ModuleParseFailed { id, .. } => *id,
        }
    }
}

/// Sender side of the session event channel.
pub type SessionEventSender = mpsc::Sender<SessionEvent>;
/// Receiver side of the session event channel.
pub type SessionEventReceiver = mpsc::Receiver<SessionEvent>;

/// Create a new session event channel.
#[must_use]
pub fn event_channel() -> (SessionEventSender, SessionEventReceiver)
{
    mpsc::channel()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_describe()
    {
        let loaded = SessionEvent::ModuleLoaded {
            id: ModuleId(2),
            functions: 3,
        };
        assert_eq!(loaded.describe(), "Loaded module#2 with 3 function(s)");

        let failed = SessionEvent::ModuleParseFailed {
            id: ModuleId(0),
            title: "Parse Error".to_string(),
            message: "Duplicate abbreviation code 1".to_string(),
        };
        assert_eq!(failed.describe(), "module#0: Parse Error (Duplicate abbreviation code 1)");
        assert_eq!(failed.module(), ModuleId(0));
    }
}
