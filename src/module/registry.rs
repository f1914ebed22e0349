//! Registry of the modules loaded for the current level.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use super::{ModuleHandle, VisualiserModule};
use crate::error::{Error, Result};
use crate::events::TraceEvent;

/// Active set of modules, addressable by id and kept in registration order.
///
/// Cloning the registry yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<RwLock<Vec<ModuleHandle>>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ModuleHandle>> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ModuleHandle>> {
        self.modules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a module, replacing any module with the same id.
    ///
    /// A replacement keeps the original registration position.
    pub fn register(&self, module: Box<dyn VisualiserModule>) -> ModuleHandle {
        let handle = ModuleHandle::new(module);
        self.register_handle(handle.clone());
        handle
    }

    /// Register an existing handle, replacing any module with the same id.
    pub fn register_handle(&self, handle: ModuleHandle) {
        let mut modules = self.write();
        match modules.iter_mut().find(|m| m.id() == handle.id()) {
            Some(slot) => {
                debug!(id = handle.id(), "Replacing registered module");
                *slot = handle;
            }
            None => {
                debug!(id = handle.id(), "Registering module");
                modules.push(handle);
            }
        }
    }

    /// Look up a module by id.
    ///
    /// An unknown id is a wiring bug and always yields
    /// [`Error::ModuleNotFound`].
    pub fn get(&self, id: &str) -> Result<ModuleHandle> {
        self.read()
            .iter()
            .find(|m| m.id() == id)
            .cloned()
            .ok_or_else(|| Error::module_not_found(id))
    }

    /// Run `f` against the module with the given id, downcast to `T`.
    ///
    /// Never blocks: a module that is mid-call yields [`Error::ModuleBusy`].
    pub fn with_module<T: VisualiserModule, R>(
        &self,
        id: &str,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        self.get(id)?.with(f)
    }

    /// Run `f` against the module with the given id, downcast to `T`, mutably.
    pub fn with_module_mut<T: VisualiserModule, R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        self.get(id)?.with_mut(f)
    }

    /// Check whether a module is registered.
    pub fn has(&self, id: &str) -> bool {
        self.read().iter().any(|m| m.id() == id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.read().iter().map(|m| m.id().to_string()).collect()
    }

    /// All module handles in registration order.
    pub fn all(&self) -> Vec<ModuleHandle> {
        self.read().clone()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Deliver an event to every module in registration order.
    pub fn broadcast(&self, event: &TraceEvent, history: &[TraceEvent]) {
        // Snapshot so modules may look each other up while handling.
        for module in self.all() {
            trace!(module = module.id(), kind = %event.kind(), "Delivering trace event");
            module.lock().handle_event(event, history);
        }
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{TrackedValue, Value};
    use crate::module::testing::RecordingModule;
    use crate::modules::VariablesModule;

    fn event(n: i64) -> TraceEvent {
        TraceEvent::init_variable(format!("v{}", n), TrackedValue::literal(Value::Integer(n)))
    }

    #[test]
    fn test_get_unknown_always_errors() {
        let registry = ModuleRegistry::new();
        for _ in 0..3 {
            assert!(matches!(
                registry.get("variables"),
                Err(Error::ModuleNotFound { id }) if id == "variables"
            ));
        }

        registry.register(Box::new(RecordingModule::new("variables")));
        registry.clear();
        assert!(registry.get("variables").is_err());
    }

    #[test]
    fn test_register_overwrites_in_place() {
        let registry = ModuleRegistry::new();
        registry.register(Box::new(RecordingModule::new("a")));
        registry.register(Box::new(RecordingModule::new("b")));
        let replacement = registry.register(Box::new(RecordingModule::new("a")));

        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert!(registry.get("a").unwrap().ptr_eq(&replacement));
    }

    #[test]
    fn test_broadcast_reaches_every_module_in_order() {
        let registry = ModuleRegistry::new();
        let first = RecordingModule::new("first");
        let second = RecordingModule::new("second");
        let (first_calls, second_calls) = (first.calls(), second.calls());
        registry.register(Box::new(first));
        registry.register(Box::new(second));

        let history = vec![event(1), event(2)];
        registry.broadcast(&history[0], &history[..1]);
        registry.broadcast(&history[1], &history[..2]);

        for calls in [first_calls, second_calls] {
            let calls = calls.lock().unwrap();
            assert_eq!(calls.events, history);
            assert_eq!(calls.history_lens, vec![1, 2]);
        }
    }

    #[test]
    fn test_typed_access() {
        let registry = ModuleRegistry::new();
        registry.register(Box::new(VariablesModule::new()));
        registry.register(Box::new(RecordingModule::new("fake")));

        let count = registry
            .with_module::<VariablesModule, _>("variables", |m| m.variables().len())
            .unwrap();
        assert_eq!(count, 0);

        assert!(matches!(
            registry.with_module::<VariablesModule, _>("fake", |_| ()),
            Err(Error::ModuleTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_typed_access_to_locked_module_is_busy() {
        let registry = ModuleRegistry::new();
        let handle = registry.register(Box::new(VariablesModule::new()));

        let guard = handle.lock();
        assert!(matches!(
            registry.with_module::<VariablesModule, _>("variables", |m| m.variables().len()),
            Err(Error::ModuleBusy { ref id }) if id == "variables"
        ));
        assert!(matches!(
            registry.with_module_mut::<VariablesModule, _>("variables", |m| m.remove_variable("x")),
            Err(Error::ModuleBusy { .. })
        ));
        drop(guard);

        assert_eq!(
            registry
                .with_module::<VariablesModule, _>("variables", |m| m.variables().len())
                .unwrap(),
            0
        );
    }
}
