//! # Session
//!
//! The context object shared by everything that happens while debugging one
//! page or process: the list of loaded modules, the hooks interested in new
//! modules and the formatting configuration.
//!
//! The registry is append-only. A module is parsed once, wrapped in an `Arc`
//! and never replaced, so handles given out earlier stay valid.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use wasmdbg_core::session::Session;
//!
//! let session = Session::new();
//! session.on_module_loaded(|module| println!("{}: {}", module.id(), module.status()));
//!
//! // Not a module, but loading never fails: the problem lands in the status
//! let module = session.module_loaded(b"\0asm\x01\0\0\0\x0a".to_vec(), BTreeMap::new());
//! assert!(!module.status().is_usable());
//! assert_eq!(session.modules().len(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::events::{SessionEvent, SessionEventSender};
use crate::host::HostBridge;
use crate::module::{ModuleHandle, ParseStatus, QueryError, ResolvedArguments};
use crate::types::ModuleId;

/// Callback run after a module is registered.
pub type ModuleHook = Arc<dyn Fn(&Arc<ModuleHandle>) + Send + Sync>;

/// Modules currently executing, innermost last.
///
/// Calls between modules nest, so the front end pushes a module when
/// execution enters it and pops it on return. Queries about "the current
/// frame" go to [`CallStack::current`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack
{
    frames: Vec<ModuleId>,
}

impl CallStack
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Execution entered `module`.
    pub fn enter(&mut self, module: ModuleId)
    {
        self.frames.push(module);
    }

    /// Execution returned from the innermost module.
    pub fn leave(&mut self) -> Option<ModuleId>
    {
        self.frames.pop()
    }

    /// Innermost executing module.
    pub fn current(&self) -> Option<ModuleId>
    {
        self.frames.last().copied()
    }

    pub fn depth(&self) -> usize
    {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.frames.is_empty()
    }
}

/// Registry of loaded modules.
///
/// ## Thread Safety
///
/// All methods take `&self`; share the session through an `Arc`. Parsing
/// runs without any lock held. Only the insertion of the finished handle
/// takes the write side, so lookups are never blocked by a load in progress.
pub struct Session
{
    next_id: AtomicU32,
    modules: RwLock<BTreeMap<ModuleId, Arc<ModuleHandle>>>,
    hooks: RwLock<Vec<ModuleHook>>,
    events: Option<SessionEventSender>,
    config: SessionConfig,
}

impl Default for Session
{
    fn default() -> Self
    {
        Self::with_config(SessionConfig::default())
    }
}

impl fmt::Debug for Session
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Session")
            .field("modules", &self.modules.read().unwrap_or_else(PoisonError::into_inner).len())
            .field("hooks", &self.hooks.read().unwrap_or_else(PoisonError::into_inner).len())
            .field("events", &self.events.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Session
{
    /// Session with the default configuration.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self
    {
        Self {
            next_id: AtomicU32::new(0),
            modules: RwLock::new(BTreeMap::new()),
            hooks: RwLock::new(Vec::new()),
            events: None,
            config,
        }
    }

    /// Publish a [`SessionEvent`] for every module loaded from now on.
    #[must_use]
    pub fn with_events(mut self, sender: SessionEventSender) -> Self
    {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &SessionConfig
    {
        &self.config
    }

    /// Run `hook` for every module registered after this call.
    pub fn on_module_loaded<F>(&self, hook: F)
    where
        F: Fn(&Arc<ModuleHandle>) + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Parse `binary` and register it.
    ///
    /// `live_exports` maps function indices to the names the running instance
    /// exports. The id is reserved before parsing starts, so concurrent loads
    /// keep ids in call order even if they finish out of order. The returned
    /// handle is already in the registry; hooks have run and the load event
    /// has been sent when this returns.
    pub fn module_loaded(&self, binary: impl Into<Arc<[u8]>>, live_exports: BTreeMap<u32, String>) -> Arc<ModuleHandle>
    {
        let id = ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(ModuleHandle::parse(id, binary, live_exports, self.config));
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&handle));
        debug!("Registered {} ({})", handle.id(), handle.status());

        // Hooks may register further hooks
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner).clone();
        for hook in &hooks {
            hook(&handle);
        }

        if let Some(sender) = &self.events {
            let event = match handle.status() {
                ParseStatus::Error { title, message } => SessionEvent::ModuleParseFailed {
                    id: handle.id(),
                    title: title.clone(),
                    message: message.clone(),
                },
                _ => SessionEvent::ModuleLoaded {
                    id: handle.id(),
                    functions: handle.functions().len(),
                },
            };
            if sender.send(event).is_err() {
                warn!("Session event receiver dropped");
            }
        }

        handle
    }

    /// Snapshot of the registered modules, in id order.
    ///
    /// Modules still being parsed are not included.
    pub fn modules(&self) -> Vec<Arc<ModuleHandle>>
    {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn module(&self, id: ModuleId) -> Option<Arc<ModuleHandle>>
    {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }

    /// Format the arguments of the function the host is stopped in.
    ///
    /// The module is the innermost one on `stack`; the frame comes from
    /// `host`.
    ///
    /// ## Errors
    ///
    /// Returns a [`QueryError`] when the stack is empty, the module is not
    /// registered, the host cannot produce a frame, or the module cannot
    /// answer (see [`ModuleHandle::resolve_arguments`]).
    pub fn resolve_arguments(&self, stack: &CallStack, host: &dyn HostBridge) -> Result<ResolvedArguments, QueryError>
    {
        let id = stack
            .current()
            .ok_or_else(|| QueryError::error("Wasm stack empty", "No wasm module is executing"))?;
        let module = self
            .module(id)
            .ok_or_else(|| QueryError::error("Module not found", format!("{id} is not registered")))?;
        let frame = host
            .current_frame()
            .map_err(|err| QueryError::error("Host error", err.to_string()))?;
        module.resolve_arguments(&frame)
    }
}
