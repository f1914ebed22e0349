//! Catalog of constructible module implementations.
//!
//! Levels name the modules they need by string. The catalog maps those names
//! to constructors and is injected into the visualiser, so tests can supply
//! fakes without touching shared state.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::VisualiserModule;
use crate::error::{Error, Result};
use crate::modules::VariablesModule;

/// Constructor for a module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn VisualiserModule> + Send + Sync>;

/// Map from module name to constructor.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every module shipped by this crate.
    pub fn builtin() -> Self {
        Self::new().with_module(VariablesModule::NAME, || Box::new(VariablesModule::new()))
    }

    /// Register a constructor under a name, replacing any existing entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn VisualiserModule> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_module<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn VisualiserModule> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Construct a module by name.
    ///
    /// Unknown names are a configuration error.
    pub fn create(&self, name: &str) -> Result<Box<dyn VisualiserModule>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::unknown_module(name))?;
        Ok(factory())
    }

    /// Check whether a name is known.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Known names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("modules", &self.names())
            .finish()
    }
}
