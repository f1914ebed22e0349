//! Module lifecycle orchestration.
//!
//! The [`Visualiser`] owns everything a level's modules share: the root
//! surface, the [`ModuleRegistry`] and the [`ModuleEventBus`]. Loading a
//! level tears down the previous module set and builds a fresh one from the
//! injected [`ModuleCatalog`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::bus::{ModuleEventBus, SubscriptionId};
use crate::error::{Error, Result};
use crate::events::TraceEvent;
use crate::level::Level;
use crate::module::{ModuleCatalog, ModuleHandle, ModuleRegistry, VisualiserContext, VisualiserModule};
use crate::render::{Renderer, SurfaceHandle};

/// Scope of the root surface.
pub const ROOT_SCOPE: &str = "visualiser";

/// Orchestrates the modules of the current level.
pub struct Visualiser {
    catalog: ModuleCatalog,
    renderer: Arc<dyn Renderer>,
    root: SurfaceHandle,
    registry: ModuleRegistry,
    bus: ModuleEventBus,
    /// One surface per loaded module, in load order
    surfaces: Vec<(String, SurfaceHandle)>,
    /// Bus subscriptions made by modules and the level hook while loading
    level_subscriptions: Vec<SubscriptionId>,
    level_id: Option<String>,
}

impl Visualiser {
    /// Create a visualiser drawing through `renderer`.
    pub fn new(catalog: ModuleCatalog, renderer: Arc<dyn Renderer>) -> Self {
        let root = SurfaceHandle::create(Arc::clone(&renderer), None, ROOT_SCOPE);
        Self {
            catalog,
            renderer,
            root,
            registry: ModuleRegistry::new(),
            bus: ModuleEventBus::new(),
            surfaces: Vec::new(),
            level_subscriptions: Vec::new(),
            level_id: None,
        }
    }

    /// Get the module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Get the module event bus.
    pub fn bus(&self) -> &ModuleEventBus {
        &self.bus
    }

    /// Get the module catalog.
    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Id of the currently loaded level, if any.
    pub fn level_id(&self) -> Option<&str> {
        self.level_id.as_deref()
    }

    /// Context handed to modules on `init`.
    pub fn context(&self) -> VisualiserContext {
        VisualiserContext {
            root: self.root.surface(),
            registry: self.registry.clone(),
            bus: self.bus.clone(),
        }
    }

    /// Load the modules a level asks for, then run the level's init hook.
    ///
    /// Any previously loaded modules are torn down first. Unknown module names
    /// and unsatisfiable dependencies fail the whole load before anything is
    /// registered. Bus subscriptions made by module `init` or the level hook
    /// belong to the level and are dropped by [`cleanup`](Self::cleanup).
    /// Returns the initialised modules in load order.
    pub fn init_level(&mut self, level: &dyn Level) -> Result<Vec<ModuleHandle>> {
        let config = level.config();
        self.cleanup();
        let mark = self.bus.mark();

        let instances = config
            .modules
            .iter()
            .map(|name| self.catalog.create(name))
            .collect::<Result<Vec<_>>>()?;
        let instances = dependency_order(&config.id, instances)?;

        // Register everything first so modules can see each other during init.
        let handles: Vec<ModuleHandle> = instances
            .into_iter()
            .map(|module| self.registry.register(module))
            .collect();

        let context = self.context();
        for handle in &handles {
            let surface =
                SurfaceHandle::create(Arc::clone(&self.renderer), Some(self.root.id()), handle.id());
            handle.lock().init(context.clone(), surface.surface());
            self.surfaces.push((handle.id().to_string(), surface));
        }
        level.init(&context, &handles);
        self.level_subscriptions = self.bus.subscriptions_since(mark);

        self.level_id = Some(config.id.clone());
        info!(
            level = %config.id,
            modules = ?self.registry.ids(),
            "Level loaded"
        );
        Ok(handles)
    }

    /// Reset every module's visual state, keeping the module set.
    pub fn reset(&mut self) {
        debug!(modules = self.registry.len(), "Resetting visualiser");
        for module in self.registry.all() {
            module.lock().reset();
        }
    }

    /// Destroy every module and its surface, drop the level's bus
    /// subscriptions, then clear the registry.
    ///
    /// Subscriptions made outside `init_level` are kept. Safe to call
    /// repeatedly and before any level has been loaded.
    pub fn cleanup(&mut self) {
        if self.registry.is_empty() && self.surfaces.is_empty() && self.level_subscriptions.is_empty() {
            return;
        }

        debug!(modules = ?self.registry.ids(), "Cleaning up visualiser");
        for id in self.level_subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        for module in self.registry.all() {
            module.lock().destroy();
        }
        for (_, mut surface) in self.surfaces.drain(..) {
            surface.release();
        }
        self.registry.clear();
        self.level_id = None;
    }

    /// Deliver a trace event to every module.
    pub fn handle_event(&self, event: &TraceEvent, history: &[TraceEvent]) {
        self.registry.broadcast(event, history);
    }

    /// Forward the per-frame hook to every module.
    pub fn update(&self, delta: Duration) {
        for module in self.registry.all() {
            module.lock().update(delta);
        }
    }
}

impl Drop for Visualiser {
    fn drop(&mut self) {
        // Modules hold the registry through their context; break the cycle.
        self.cleanup();
    }
}

impl std::fmt::Debug for Visualiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualiser")
            .field("level_id", &self.level_id)
            .field("registry", &self.registry)
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Order modules so every module comes after its dependencies.
///
/// Ties keep the level's list order.
fn dependency_order(
    level_id: &str,
    modules: Vec<Box<dyn VisualiserModule>>,
) -> Result<Vec<Box<dyn VisualiserModule>>> {
    let ids: Vec<String> = modules.iter().map(|m| m.id().to_string()).collect();
    let deps: Vec<Vec<String>> = modules.iter().map(|m| m.dependencies()).collect();

    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            return Err(Error::invalid_level(
                level_id,
                format!("module id {} is loaded more than once", id),
            ));
        }
    }

    for (id, module_deps) in ids.iter().zip(&deps) {
        if let Some(missing) = module_deps.iter().find(|d| !ids.contains(d)) {
            return Err(Error::MissingDependency {
                module: id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut placed = vec![false; modules.len()];
    let mut order = Vec::with_capacity(modules.len());
    while order.len() < modules.len() {
        let next = (0..modules.len()).find(|&i| {
            !placed[i]
                && deps[i].iter().all(|dep| {
                    ids.iter()
                        .position(|id| id == dep)
                        .is_some_and(|j| placed[j])
                })
        });

        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                let remaining = (0..modules.len())
                    .filter(|&i| !placed[i])
                    .map(|i| ids[i].clone())
                    .collect();
                return Err(Error::DependencyCycle { modules: remaining });
            }
        }
    }

    let mut slots: Vec<Option<Box<dyn VisualiserModule>>> = modules.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
