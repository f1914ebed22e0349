//! Visualiser module contract.
//!
//! A visualiser module owns one facet of the on-screen state (variables,
//! and later call stacks, scopes or arrays). Modules are constructed from a
//! [`ModuleCatalog`] when a level loads, registered in the
//! [`ModuleRegistry`], and fed every trace event in order.
//!
//! # Lifecycle
//!
//! ```text
//! construct -> init(context, surface) -> handle_event* -> reset -> handle_event* ... -> destroy
//! ```
//!
//! # Contract
//!
//! - `handle_event` updates state synchronously before returning and silently
//!   ignores event kinds or shapes it does not care about. It never panics on
//!   well-formed input.
//! - `reset` clears module-owned elements and state but keeps the surface and
//!   bus subscriptions.
//! - `destroy` releases everything; the module is unusable afterwards.
//! - The registry holds a module's lock while delivering an event to it, and
//!   bus listeners run inside that delivery. Typed access through
//!   [`ModuleHandle::with`] or [`ModuleRegistry::with_module`] never blocks:
//!   reading a module that is mid-call yields [`Error::ModuleBusy`]. Listeners
//!   should read the event payload instead of the publishing module.

mod catalog;
mod registry;

pub use catalog::{ModuleCatalog, ModuleFactory};
pub use registry::ModuleRegistry;

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use crate::bus::ModuleEventBus;
use crate::error::{Error, Result};
use crate::events::TraceEvent;
use crate::render::RenderSurface;

/// Shared session context handed to every module on `init`.
#[derive(Debug, Clone)]
pub struct VisualiserContext {
    /// Root surface of the visualiser
    pub root: RenderSurface,
    /// Registry of all modules loaded for this level
    pub registry: ModuleRegistry,
    /// Module event bus
    pub bus: ModuleEventBus,
}

/// Trait for pluggable visualiser modules.
pub trait VisualiserModule: Send + 'static {
    /// Stable identifier, unique within a registry.
    fn id(&self) -> &str;

    /// Ids of modules that must be initialised before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Store the shared context and this module's dedicated surface.
    fn init(&mut self, context: VisualiserContext, surface: RenderSurface);

    /// Consume one trace event.
    ///
    /// `history` holds every event delivered so far, including `event` as its
    /// last element.
    fn handle_event(&mut self, event: &TraceEvent, history: &[TraceEvent]);

    /// Clear module-owned visual elements and state.
    fn reset(&mut self);

    /// Release all visual elements and resources.
    fn destroy(&mut self);

    /// Per-frame hook for time-based animation.
    fn update(&mut self, _delta: Duration) {}

    /// Upcast for typed access through the registry.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access through the registry.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared, lockable handle to a registered module.
#[derive(Clone)]
pub struct ModuleHandle {
    id: String,
    module: Arc<Mutex<Box<dyn VisualiserModule>>>,
}

impl ModuleHandle {
    /// Wrap a module instance.
    pub fn new(module: Box<dyn VisualiserModule>) -> Self {
        Self {
            id: module.id().to_string(),
            module: Arc::new(Mutex::new(module)),
        }
    }

    /// Get the module id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the module for a call.
    ///
    /// Blocks while another call holds the module.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn VisualiserModule>> {
        self.module.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the module without waiting.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, Box<dyn VisualiserModule>>> {
        match self.module.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::module_busy(&self.id)),
        }
    }

    /// Run `f` against the module downcast to `T`.
    ///
    /// Fails with [`Error::ModuleBusy`] instead of blocking if the module is
    /// locked, and with [`Error::ModuleTypeMismatch`] if it is not a `T`.
    pub fn with<T: VisualiserModule, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self.try_lock()?;
        guard
            .as_any()
            .downcast_ref::<T>()
            .map(f)
            .ok_or_else(|| self.type_mismatch::<T>())
    }

    /// Run `f` against the module downcast to `T`, mutably.
    pub fn with_mut<T: VisualiserModule, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.try_lock()?;
        guard
            .as_any_mut()
            .downcast_mut::<T>()
            .map(f)
            .ok_or_else(|| self.type_mismatch::<T>())
    }

    fn type_mismatch<T>(&self) -> Error {
        Error::ModuleTypeMismatch {
            id: self.id.clone(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Whether two handles point at the same module instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.module, &other.module)
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle").field("id", &self.id).finish()
    }
}
